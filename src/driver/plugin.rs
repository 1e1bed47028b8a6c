use std::time::Duration;

use crate::{
    common::{SchedulerError, TaskContext},
    driver::context::DriverContext,
};

/// 驱动器插件/钩子接口
///
/// 用户可以通过实现此 Trait 来介入工作线程的生命周期。
/// 常见用途：
/// - 自定义日志/监控 (Metrics)
/// - 错误报警 (Alerting)
///
/// 所有钩子都在工作线程上同步调用，耗时的插件会推迟后续任务的触发。
pub trait DriverPlugin: Send + Sync + 'static {
    /// [生命周期] 工作线程启动时调用
    fn on_start(&self, _ctx: &DriverContext) {}

    /// [生命周期] 工作线程退出前调用 (队列已空或已被丢弃)
    fn on_shutdown(&self, _ctx: &DriverContext) {}

    /// [任务] 任务开始执行前调用
    fn before_execute(&self, _ctx: &TaskContext) {}

    /// [执行后] 任务执行结束 (无论成功失败都会调用)
    fn after_execute(&self, _ctx: &TaskContext, _elapsed: Duration) {}

    /// [执行成功] 任务体返回 Ok
    fn on_success(&self, _ctx: &TaskContext) {}

    /// [执行失败] 任务体返回 Err 或 Panic
    fn on_failure(&self, _ctx: &TaskContext, _error: &SchedulerError) {}
}
