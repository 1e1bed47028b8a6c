pub mod config;
pub mod error;
pub mod model;
pub mod task;
pub mod time;
pub mod traits;
pub(crate) mod utils;

// 导出配置
pub use config::{PolicyConfig, SchedulerConfig, WorkerConfig};

// 导出错误类型
pub use error::{Result, SchedulerError};

// 导出核心模型
pub use model::{Millis, ScheduleType, SchedulerStats, TaskContext, TaskState};
pub use task::TimerTask;

// 导出用户需实现的 Trait
pub use traits::SchedulableTask;

pub use time::{Clock, ManualClock, SystemClock, TimeUtils};
// 内部工具的快捷访问
pub(crate) use utils::{new_task_id, next_thread_name};
