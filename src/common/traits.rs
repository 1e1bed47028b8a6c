use crate::common::model::TaskContext;

// ==========================================
// 核心任务接口 (SchedulableTask)
// ==========================================

/// 可调度任务接口
///
/// 任务体在 Timer 的工作线程上同步执行，执行期间不持有任何调度器的锁，
/// 因此可以在里面安全地取消自己或向同一个 Timer 提交新任务。
///
/// - `Ok(())`: 本次触发成功。
/// - `Err(e)`: 本次触发失败。调度器只记录日志并通知插件，不重试，
///   周期任务的下一次触发不受影响。Panic 的处理方式相同。
///
/// 任务体应尽快返回：所有任务共享一个工作线程，长时间运行会推迟其他任务。
pub trait SchedulableTask: Send + Sync + 'static {
    fn execute(&self, ctx: &TaskContext) -> anyhow::Result<()>;
}

/// 闭包适配器，见 [`TimerTask::from_fn`](crate::common::TimerTask::from_fn)
pub(crate) struct FnTask<F>(pub(crate) F);

impl<F> SchedulableTask for FnTask<F>
where
    F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn execute(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        (self.0)(ctx)
    }
}
