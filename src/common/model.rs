use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::{Result, TimeUtils, TimerTask};

/// 绝对时间戳 / 带符号时长，单位毫秒
pub type Millis = i64;

// ==========================================
// 1. 任务状态枚举 (TaskState)
// ==========================================

/// 任务生命周期状态
///
/// 流转: `Virgin -> Scheduled -> (Executed | Cancelled)`，后两者为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// 初始态
    /// - 刚创建，还没有交给任何 Timer。
    Virgin,

    /// 排队中
    /// - 已进入某个 Timer 的队列。一次性任务尚未触发；周期任务还会继续触发。
    Scheduled,

    /// 已执行
    /// - 一次性任务已经触发 (或正在执行)。
    Executed,

    /// 已取消
    /// - 不会再有任何后续触发。
    Cancelled,
}

// ==========================================
// 2. 调度类型 (ScheduleType)
// ==========================================

/// 任务调度类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleType {
    /// 一次性任务
    Once,

    /// 固定频率
    /// 下次触发 = 上次*计划*触发时间 + 周期。落后时会连续补触发，不漂移。
    FixedRate(Duration),

    /// 固定延时
    /// 下次触发 = 上次*实际*触发时间 + 周期。会漂移，但不会补触发。
    FixedDelay(Duration),
}

impl ScheduleType {
    /// 转换为带符号的周期 (毫秒)
    ///
    /// - `0`: 一次性
    /// - 正数: 固定频率
    /// - 负数: 固定延时
    pub fn signed_period(&self) -> Result<Millis> {
        match self {
            ScheduleType::Once => Ok(0),
            ScheduleType::FixedRate(period) => TimeUtils::period_millis(*period),
            ScheduleType::FixedDelay(period) => TimeUtils::period_millis(*period).map(|p| -p),
        }
    }
}

// ==========================================
// 3. 运行时上下文 (TaskContext)
// ==========================================

/// 单次触发的运行时上下文
///
/// 由工作线程在每次触发时构造，传给任务体。任务体可以通过它取消自己。
#[derive(Debug, Clone)]
pub struct TaskContext {
    task: TimerTask,
    scheduled_time: Millis,
    fired_at: Millis,
}

impl TaskContext {
    pub(crate) fn new(task: TimerTask, scheduled_time: Millis, fired_at: Millis) -> Self {
        Self {
            task,
            scheduled_time,
            fired_at,
        }
    }

    /// 当前正在执行的任务句柄
    pub fn task(&self) -> &TimerTask {
        &self.task
    }

    pub fn id(&self) -> &str {
        self.task.id()
    }

    /// 本次触发对应的计划时间
    pub fn scheduled_time(&self) -> Millis {
        self.scheduled_time
    }

    /// 工作线程实际判定触发的时间
    pub fn fired_at(&self) -> Millis {
        self.fired_at
    }

    /// 实际触发比计划晚了多少
    pub fn lateness(&self) -> Duration {
        TimeUtils::wait_duration(self.fired_at, self.scheduled_time)
    }

    /// 取消当前任务，阻止后续所有触发
    pub fn cancel(&self) -> bool {
        self.task.cancel()
    }
}

// ==========================================
// 4. 统计指标 (SchedulerStats)
// ==========================================

/// 调度器运行时统计快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// 队列中的任务数 (含尚未被清理的已取消任务)
    pub pending_tasks: usize,
    /// 正在执行的任务数 (0 或 1)
    pub running_tasks: usize,
    /// 累计触发次数
    pub fired_count: u64,
    /// 累计成功次数
    pub completed_count: u64,
    /// 累计失败次数 (Err 或 Panic)
    pub failed_count: u64,
    /// 工作线程丢弃的已取消任务数
    pub skipped_count: u64,
    /// `purge()` 清理的已取消任务数
    pub purged_count: u64,
    /// 错误率 (0.0 - 1.0)
    pub error_rate: f64,
}
