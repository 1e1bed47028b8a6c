use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use crate::common::{Result, SchedulerError, TaskContext};
use crate::driver::PacemakerEvent;
use crate::driver::context::DriverContext;
use crate::driver::pacemaker::{FiredTask, TaskPacemaker};
use crate::driver::plugin::DriverPlugin;

/// 终止守卫 (TerminationGuard) - 工作线程退出时的 RAII 清理
///
/// 无论主循环是正常返回还是因为插件 Panic 而栈展开，
/// 都会关闭调度入口并清空队列，之后的 `schedule` 调用会得到 `SchedulerShutdown`，
/// 而不是把任务塞进一个再也不会被处理的队列。
struct TerminationGuard<'a> {
    ctx: &'a DriverContext,
}

impl Drop for TerminationGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(
                "[Driver-{}] Worker is unwinding, discarding pending tasks.",
                self.ctx.name
            );
        }
        let discarded = self.ctx.terminate(true);
        if discarded > 0 {
            debug!(
                "[Driver-{}] Discarded {} pending tasks on exit.",
                self.ctx.name, discarded
            );
        }
    }
}

/// 任务驱动器 (The Engine)
///
/// 独占一个后台线程：等待堆顶到期，在不持有任何锁的情况下执行任务体，然后继续等待。
/// 同一个 Timer 上的任务严格串行执行，某个任务耗时过长会推迟其它任务。
pub struct TaskDriver {
    /// 全局上下文
    ctx: Arc<DriverContext>,
    /// 插件系统
    plugins: Vec<Box<dyn DriverPlugin>>,
}

impl TaskDriver {
    pub fn new(ctx: Arc<DriverContext>, plugins: Vec<Box<dyn DriverPlugin>>) -> Self {
        Self { ctx, plugins }
    }

    /// 在新线程上启动引擎
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(self.ctx.name.clone());
        if let Some(size) = self.ctx.config.worker.stack_size {
            builder = builder.stack_size(size);
        }
        Ok(builder.spawn(move || self.run())?)
    }

    /// 运行引擎 (阻塞直到停机且队列耗尽)
    pub fn run(&self) {
        {
            // 守卫覆盖启动钩子：on_start Panic 也要关闭调度入口
            let _guard = TerminationGuard { ctx: &self.ctx };

            // [Hook] 启动
            for p in self.plugins.iter() {
                p.on_start(&self.ctx);
            }
            debug!("[Driver-{}] Started. Waiting for tasks...", self.ctx.name);

            self.main_loop();
        }

        // [Hook] 关闭
        for p in self.plugins.iter() {
            p.on_shutdown(&self.ctx);
        }
        debug!("[Driver-{}] Shutdown complete.", self.ctx.name);
    }

    /// 主循环
    ///
    /// 职责：
    /// 1. 监听起搏器 (Pacemaker) 的信号 (Trigger/Shutdown)。
    /// 2. 在锁外执行到期任务。
    fn main_loop(&self) {
        let mut pacemaker = TaskPacemaker::new(&self.ctx);
        loop {
            match pacemaker.wait_next() {
                PacemakerEvent::Trigger(fired) => self.execute_task(fired),
                PacemakerEvent::Shutdown => break,
            }
        }
    }

    // ==========================================
    // Core Logic: 执行逻辑
    // ==========================================

    /// 执行任务
    ///
    /// 任务体返回 Err 或 Panic 都只影响这一次触发：记录日志、通知插件，
    /// 周期任务的下一次触发已经在出队时排好，照常进行。
    fn execute_task(&self, fired: FiredTask) {
        let FiredTask {
            task,
            scheduled_time,
            fired_at,
        } = fired;
        let runtime_ctx = TaskContext::new(task, scheduled_time, fired_at);
        let task_id = runtime_ctx.id().to_string();

        // Hook: 执行前
        for p in self.plugins.iter() {
            p.before_execute(&runtime_ctx);
        }
        let start_time = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| runtime_ctx.task().run(&runtime_ctx)));
        let elapsed = start_time.elapsed();

        // [Hook] 执行后 (通用)
        for p in self.plugins.iter() {
            p.after_execute(&runtime_ctx, elapsed);
        }
        self.check_slow(&task_id, elapsed);

        // 处理执行结果
        match result {
            Ok(Ok(())) => {
                trace!("[Driver] Task {} completed in {:?}", task_id, elapsed);
                // [Hook] 成功钩子
                for p in self.plugins.iter() {
                    p.on_success(&runtime_ctx);
                }
            }
            Ok(Err(e)) => {
                let err = SchedulerError::fault(&task_id, e);
                warn!("[Driver] {}", err);
                // [Hook] 失败钩子
                for p in self.plugins.iter() {
                    p.on_failure(&runtime_ctx, &err);
                }
            }
            Err(payload) => {
                let err = SchedulerError::from_panic(&task_id, payload);
                error!("[Driver] {}", err);
                // [Hook] 失败钩子
                for p in self.plugins.iter() {
                    p.on_failure(&runtime_ctx, &err);
                }
            }
        }
    }

    fn check_slow(&self, task_id: &str, elapsed: Duration) {
        let threshold = self.ctx.config.policy.slow_task_threshold_ms;
        if threshold > 0 && elapsed > Duration::from_millis(threshold) {
            warn!(
                "[Driver-{}] Task {} took {:?}, later tasks were delayed.",
                self.ctx.name, task_id, elapsed
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ManualClock, Millis, SchedulerConfig, TaskState, TimerTask};
    use crate::driver::DriverMetrics;
    use crate::driver::plugins::MetricsPlugin;
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    struct RecordingPlugin(Arc<Recorder>);

    impl DriverPlugin for RecordingPlugin {
        fn on_start(&self, _ctx: &DriverContext) {
            self.0.events.lock().push("start".into());
        }
        fn on_shutdown(&self, _ctx: &DriverContext) {
            self.0.events.lock().push("shutdown".into());
        }
        fn before_execute(&self, ctx: &TaskContext) {
            self.0.events.lock().push(format!("before@{}", ctx.scheduled_time()));
        }
        fn on_success(&self, _ctx: &TaskContext) {
            self.0.events.lock().push("ok".into());
        }
        fn on_failure(&self, _ctx: &TaskContext, error: &SchedulerError) {
            assert!(error.is_task_fault());
            self.0.events.lock().push(format!("failed: {}", error));
        }
    }

    fn context(now: Millis) -> Arc<DriverContext> {
        Arc::new(DriverContext::new(
            "test-driver".into(),
            SchedulerConfig::default(),
            Arc::new(ManualClock::new(now)),
            Arc::new(DriverMetrics::default()),
        ))
    }

    fn enqueue(ctx: &DriverContext, task: &TimerTask, at: Millis) {
        let mut state = ctx.lock();
        task.schedule(at, 0).expect("schedule");
        state.queue.insert(at, task.clone());
    }

    /// 所有任务都已到期时，停机后在当前线程上跑完队列再返回
    fn drain(ctx: &Arc<DriverContext>, recorder: &Arc<Recorder>) {
        ctx.terminate(false);
        let plugins: Vec<Box<dyn DriverPlugin>> = vec![
            Box::new(MetricsPlugin::new(ctx.metrics.clone())),
            Box::new(RecordingPlugin(recorder.clone())),
        ];
        TaskDriver::new(ctx.clone(), plugins).run();
    }

    #[test]
    fn failures_are_isolated_and_reported() {
        let ctx = context(1_000);
        let recorder = Arc::new(Recorder::default());

        let failing = TimerTask::from_fn(|_| Err(anyhow::anyhow!("boom")));
        let panicking = TimerTask::from_fn(|_| panic!("kaboom"));
        let fine = TimerTask::from_fn(|_| Ok(()));
        enqueue(&ctx, &failing, 10);
        enqueue(&ctx, &panicking, 20);
        enqueue(&ctx, &fine, 30);

        drain(&ctx, &recorder);

        let events = recorder.events.lock().clone();
        assert_eq!(events.first().map(String::as_str), Some("start"));
        assert_eq!(events.last().map(String::as_str), Some("shutdown"));
        assert!(events.iter().any(|e| e.contains("boom")));
        assert!(events.iter().any(|e| e.contains("Panic: kaboom")));
        assert_eq!(events.iter().filter(|e| *e == "ok").count(), 1);

        let m = &ctx.metrics;
        assert_eq!(m.total_fired.load(Ordering::Relaxed), 3);
        assert_eq!(m.total_success.load(Ordering::Relaxed), 1);
        assert_eq!(m.total_failure.load(Ordering::Relaxed), 2);
        assert_eq!(m.active_tasks.load(Ordering::Relaxed), 0);
        for task in [&failing, &panicking, &fine] {
            assert_eq!(task.state(), TaskState::Executed);
        }
    }

    #[test]
    fn tasks_run_in_deadline_order() {
        let ctx = context(1_000);
        let recorder = Arc::new(Recorder::default());
        for at in [300, 100, 200] {
            enqueue(&ctx, &TimerTask::from_fn(|_| Ok(())), at);
        }

        drain(&ctx, &recorder);

        let order: Vec<String> = recorder
            .events
            .lock()
            .iter()
            .filter(|e| e.starts_with("before"))
            .cloned()
            .collect();
        assert_eq!(order, vec!["before@100", "before@200", "before@300"]);
    }

    #[test]
    fn exit_closes_the_queue() {
        let ctx = context(0);
        let recorder = Arc::new(Recorder::default());
        drain(&ctx, &recorder);
        assert!(ctx.is_shutdown());
        assert_eq!(ctx.pending_count(), 0);
    }
}
