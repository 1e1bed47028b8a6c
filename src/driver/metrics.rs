use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// 驱动器核心指标
// 使用 Atomic，门面线程读取时不需要拿队列锁
#[derive(Debug, Default, Serialize)]
pub struct DriverMetrics {
    // --- 瞬时状态 (Gauges) ---
    /// - 当前正在执行的任务数 (单工作线程，只会是 0 或 1)
    pub active_tasks: AtomicUsize,

    // --- 累积计数 (Counters) ---
    /// 历史总触发次数
    pub total_fired: AtomicU64,

    /// 历史总成功任务数
    pub total_success: AtomicU64,

    /// 历史总失败任务数 (Err 或 Panic)
    pub total_failure: AtomicU64,

    /// 工作线程在堆顶发现并丢弃的已取消任务数
    pub total_skipped: AtomicU64,

    /// `purge()` 清理掉的已取消任务数
    pub total_purged: AtomicU64,
}

impl DriverMetrics {
    /// 增加活跃数 (开始做任务)
    pub fn inc_active(&self) {
        self.active_tasks.fetch_add(1, Ordering::Relaxed);
    }

    /// 减少活跃数 (任务结束)
    pub fn dec_active(&self) {
        self.active_tasks.fetch_sub(1, Ordering::Relaxed);
    }

    /// 记录一次触发
    pub fn inc_fired(&self) {
        self.total_fired.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录成功
    pub fn inc_success(&self) {
        self.total_success.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录失败
    pub fn inc_failure(&self) {
        self.total_failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.total_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_purged(&self, n: usize) {
        self.total_purged.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// 错误率 (0.0 - 1.0)，没有完成过任务时为 0
    pub fn error_rate(&self) -> f64 {
        let success = self.total_success.load(Ordering::Relaxed);
        let failure = self.total_failure.load(Ordering::Relaxed);
        let finished = success + failure;
        if finished == 0 {
            0.0
        } else {
            failure as f64 / finished as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_over_finished_tasks() {
        let metrics = DriverMetrics::default();
        assert_eq!(metrics.error_rate(), 0.0);
        metrics.inc_success();
        metrics.inc_success();
        metrics.inc_success();
        metrics.inc_failure();
        assert!((metrics.error_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn serializes_as_plain_numbers() {
        let metrics = DriverMetrics::default();
        metrics.inc_fired();
        metrics.add_purged(3);
        let json = serde_json::to_value(&metrics).expect("serialize");
        assert_eq!(json["total_fired"], 1);
        assert_eq!(json["total_purged"], 3);
        assert_eq!(json["active_tasks"], 0);
    }
}
