use std::any::Any;

use thiserror::Error;

/// 调度器统一结果类型
///
/// 使用此别名可以简化函数签名：`fn do_something() -> Result<()>`
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    // ==========================================
    // 1. 配置与启动错误 (Configuration & Startup)
    // ==========================================
    /// 配置错误
    ///
    /// - 触发场景: 队列初始容量为 0、线程栈大小为 0 等无法启动的配置。
    /// - 后果: `TimerBuilder::build` 失败，不会创建工作线程。
    #[error("Configuration error: {0}")]
    Config(String),

    /// 工作线程创建失败
    ///
    /// - 触发场景: 操作系统拒绝创建新线程 (资源耗尽)。
    #[error("Failed to spawn timer worker: {0}")]
    Io(#[from] std::io::Error),

    /// 工作线程异常退出
    ///
    /// - 触发场景: 插件钩子 Panic，导致工作线程栈展开。
    /// - 说明: 任务本身的 Panic 会被隔离，不会走到这里。
    #[error("Timer worker terminated abnormally: {0}")]
    WorkerAborted(String),

    // ==========================================
    // 2. 调度接口错误 (Scheduling API)
    // ==========================================
    /// 调度器已停机
    ///
    /// - 触发场景: 在 `shutdown()` / `shutdown_now()` 之后，或工作线程已经终止，仍尝试提交新任务。
    /// - 处理: 新建一个 `Timer`。
    #[error("Timer already shut down, rejecting new tasks.")]
    SchedulerShutdown,

    /// 任务状态非法
    ///
    /// - 触发场景: 同一个任务被重复调度，或调度一个已取消/已执行的任务。
    #[error("Invalid task state: {0}")]
    InvalidState(String),

    /// 参数非法
    ///
    /// - 触发场景: 周期为 0、延时或周期超出可表示范围、执行时间早于 Unix 纪元。
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ==========================================
    // 3. 执行错误 (Execution)
    // ==========================================
    /// 任务执行失败 (返回 Err 或 Panic)
    ///
    /// - 只在工作线程内部构造，交给日志和插件，永远不会返回给调用方。
    /// - 不会重试；周期任务的下一次触发照常进行。
    #[error("Task {task_id} execution failed: {source}")]
    TaskExecutionFault {
        task_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl SchedulerError {
    /// 包装任务返回的错误
    pub(crate) fn fault(task_id: &str, source: anyhow::Error) -> Self {
        SchedulerError::TaskExecutionFault {
            task_id: task_id.to_string(),
            source,
        }
    }

    /// 把 `catch_unwind` 捕获到的 Panic 载荷转换成执行错误
    pub(crate) fn from_panic(task_id: &str, payload: Box<dyn Any + Send>) -> Self {
        Self::fault(task_id, anyhow::anyhow!(panic_message(payload.as_ref())))
    }

    /// 是否是任务执行期产生的错误
    pub fn is_task_fault(&self) -> bool {
        matches!(self, SchedulerError::TaskExecutionFault { .. })
    }
}

/// 提取 Panic 信息
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Panic: {}", s)
    } else {
        "Panic: Unknown error".to_string()
    }
}
