use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::common::{Millis, Result, SchedulerError};

/// 周期绝对值上限，超过后 `执行时间 + 周期` 有溢出风险
pub const MAX_PERIOD_MILLIS: Millis = i64::MAX >> 1;

// ==========================================
// 1. 时钟接口 (Clock)
// ==========================================

/// 时钟接口
///
/// 工作线程和 Timer 门面都只通过它获取“现在”，测试时可以替换成 [`ManualClock`]。
pub trait Clock: Send + Sync + 'static {
    /// 当前时间 (Unix 毫秒)
    fn now_millis(&self) -> Millis;
}

impl<C: Clock> Clock for Arc<C> {
    fn now_millis(&self) -> Millis {
        self.as_ref().now_millis()
    }
}

/// 系统墙上时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        TimeUtils::now_millis()
    }
}

/// 手动时钟，只有显式推进时才会走
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// 向前推进，返回推进后的时间
    pub fn advance(&self, by: Duration) -> Millis {
        let delta = Millis::try_from(by.as_millis()).unwrap_or(Millis::MAX);
        let prev = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(delta))
            })
            .unwrap_or_else(|t| t);
        prev.saturating_add(delta)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}

// ==========================================
// 2. 时间计算 (TimeUtils)
// ==========================================

/// 全局统一的时间与调度计算器
pub struct TimeUtils;

impl TimeUtils {
    /// [标准] 当前 Unix 时间戳 (毫秒)
    pub fn now_millis() -> Millis {
        Utc::now().timestamp_millis()
    }

    /// 延时转毫秒
    pub fn delay_millis(delay: Duration) -> Result<Millis> {
        Millis::try_from(delay.as_millis())
            .map_err(|_| SchedulerError::InvalidArgument(format!("Delay too large: {:?}", delay)))
    }

    /// 周期转毫秒 (必须为正，且不超过 [`MAX_PERIOD_MILLIS`])
    pub fn period_millis(period: Duration) -> Result<Millis> {
        let millis = Millis::try_from(period.as_millis()).unwrap_or(Millis::MAX);
        if millis <= 0 {
            return Err(SchedulerError::InvalidArgument(format!(
                "Non-positive period: {:?}",
                period
            )));
        }
        if millis > MAX_PERIOD_MILLIS {
            return Err(SchedulerError::InvalidArgument(format!(
                "Period too large: {:?}",
                period
            )));
        }
        Ok(millis)
    }

    /// 计算 `now + delay`，溢出时报参数错误
    pub fn fire_time_after(now: Millis, delay: Duration) -> Result<Millis> {
        let delay = Self::delay_millis(delay)?;
        now.checked_add(delay).ok_or_else(|| {
            SchedulerError::InvalidArgument(format!("Execution time overflows: {} + {}", now, delay))
        })
    }

    /// 日历时间转时间戳 (不允许早于 Unix 纪元)
    pub fn datetime_to_millis(at: DateTime<Utc>) -> Result<Millis> {
        let millis = at.timestamp_millis();
        if millis < 0 {
            return Err(SchedulerError::InvalidArgument(format!(
                "Illegal execution time: {}",
                at
            )));
        }
        Ok(millis)
    }

    /// 计算周期任务的下一次触发时间
    ///
    /// - `period < 0` (固定延时): `current_time - period`
    /// - `period > 0` (固定频率): `execution_time + period`
    pub fn next_recurrence_time(execution_time: Millis, period: Millis, current_time: Millis) -> Millis {
        if period < 0 {
            current_time.saturating_sub(period)
        } else {
            execution_time.saturating_add(period)
        }
    }

    /// 距离 deadline 还要等多久 (已过期则为 0)
    pub fn wait_duration(deadline: Millis, now: Millis) -> Duration {
        let remaining = deadline.saturating_sub(now);
        Duration::from_millis(u64::try_from(remaining).unwrap_or(0))
    }
}
