// 1. 基础模块
pub mod common;

// 2. 截止时间队列
pub mod queue;

// 3. 核心引擎 (工作线程)
pub mod driver;

// 4. 调度器门面
pub mod scheduler;

pub use common::{
    Clock, ManualClock, Millis, Result, SchedulableTask, ScheduleType, SchedulerConfig,
    SchedulerError, SchedulerStats, SystemClock, TaskContext, TaskState, TimerTask,
};
pub use driver::{DriverMetrics, DriverPlugin};
pub use scheduler::{Timer, TimerBuilder};
