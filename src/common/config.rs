use serde::{Deserialize, Serialize};

use crate::common::{Result, SchedulerError};

// ==========================================
// 1. 工作线程配置 (WorkerConfig)
// ==========================================

/// 工作线程与队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 工作线程名
    ///
    /// - 默认值: `talos-timer-<序号>`，序号进程内递增。
    pub thread_name: Option<String>,

    /// 队列初始容量
    ///
    /// - 说明: 堆数组的初始槽位数，写满后按 2 倍扩容。
    /// - 默认值: 128
    pub queue_capacity: usize,

    /// 工作线程栈大小 (字节)
    ///
    /// - 默认值: 使用标准库默认值。
    /// - 建议: 任务体递归较深时调大。
    pub stack_size: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: None,
            queue_capacity: 128,
            stack_size: None,
        }
    }
}

// ==========================================
// 2. 策略配置 (PolicyConfig)
// ==========================================

/// 执行策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// 慢任务告警阈值 (毫秒)
    ///
    /// - 说明: 所有任务共用一个工作线程，任务体执行超过此时长会打印告警，
    ///   因为它推迟了后面所有到期任务。
    /// - 默认值: 1000 ms；0 表示关闭。
    pub slow_task_threshold_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            slow_task_threshold_ms: 1000,
        }
    }
}

// ==========================================
// 3. 总配置入口 (SchedulerConfig)
// ==========================================

/// 调度器总配置
///
/// 支持 `serde` 序列化，可直接从 YAML/JSON 加载，缺省字段取默认值。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 工作线程与队列
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 执行策略
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl SchedulerConfig {
    /// 指定工作线程名的配置
    pub fn named(name: impl Into<String>) -> Self {
        let mut cfg = Self::default();
        cfg.worker.thread_name = Some(name.into());
        cfg
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.worker.queue_capacity == 0 {
            return Err(SchedulerError::Config(
                "worker.queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.worker.stack_size == Some(0) {
            return Err(SchedulerError::Config(
                "worker.stack_size must be greater than 0".to_string(),
            ));
        }
        if self
            .worker
            .thread_name
            .as_deref()
            .is_some_and(|name| name.contains('\0'))
        {
            return Err(SchedulerError::Config(
                "worker.thread_name must not contain NUL bytes".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: SchedulerConfig =
            serde_json::from_str(r#"{ "worker": { "thread_name": "billing" } }"#)
                .expect("config parses");
        assert_eq!(cfg.worker.thread_name.as_deref(), Some("billing"));
        assert_eq!(cfg.worker.queue_capacity, 128);
        assert_eq!(cfg.policy.slow_task_threshold_ms, 1000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut cfg = SchedulerConfig::named("t");
        cfg.worker.queue_capacity = 0;
        assert!(matches!(cfg.validate(), Err(SchedulerError::Config(_))));
    }

    #[test]
    fn zero_stack_is_rejected() {
        let mut cfg = SchedulerConfig::default();
        cfg.worker.stack_size = Some(0);
        assert!(cfg.validate().is_err());
    }
}
