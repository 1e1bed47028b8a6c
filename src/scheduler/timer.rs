use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use tracing::{debug, trace};

use crate::{
    common::{
        Millis, Result, ScheduleType, SchedulerError, SchedulerStats, TaskState, TimeUtils,
        TimerTask, error::panic_message,
    },
    driver::{DriverContext, DriverMetrics},
    scheduler::TimerBuilder,
};

struct TimerInner {
    ctx: Arc<DriverContext>,
    worker_id: ThreadId,
    /// `wait_for_termination` 取走之后为 `None`
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for TimerInner {
    /// 最后一个句柄消失：不再可能有新任务，工作线程跑完剩余任务后退出
    fn drop(&mut self) {
        if !self.ctx.is_shutdown() {
            trace!("[Timer-{}] Last handle dropped, shutting down.", self.ctx.name);
            self.ctx.terminate(false);
        }
    }
}

/// 定时器 (The Public Face)
///
/// 这是用户直接交互的对象。每个 Timer 独占一个后台工作线程，
/// 所有任务按到期时间在这个线程上串行执行。
///
/// 句柄可以廉价克隆并在线程间共享；最后一个句柄被 Drop 时，
/// 等价于调用一次 [`shutdown`](Self::shutdown)。
///
/// ```no_run
/// use std::time::Duration;
/// use talos_timer::{Timer, TimerTask};
///
/// let timer = Timer::new()?;
/// let tick = TimerTask::from_fn(|ctx| {
///     println!("tick, {:?} late", ctx.lateness());
///     Ok(())
/// });
/// timer.schedule_fixed_rate(&tick, Duration::ZERO, Duration::from_secs(1))?;
/// # Ok::<(), talos_timer::SchedulerError>(())
/// ```
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerInner>,
}

impl Timer {
    /// 使用默认配置创建并启动
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// 指定工作线程名创建并启动
    pub fn named(name: impl Into<String>) -> Result<Self> {
        Self::builder().with_thread_name(name).build()
    }

    pub fn builder() -> TimerBuilder {
        TimerBuilder::new()
    }

    pub(crate) fn from_parts(ctx: Arc<DriverContext>, handle: JoinHandle<()>) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                ctx,
                worker_id: handle.thread().id(),
                handle: Mutex::new(Some(handle)),
            }),
        }
    }

    /// 工作线程名
    pub fn name(&self) -> &str {
        &self.inner.ctx.name
    }

    // ==========================================
    // 调度接口
    // ==========================================

    /// 通用入口：`delay` 之后首次触发，之后按 `schedule_type` 重复
    pub fn schedule(
        &self,
        task: &TimerTask,
        delay: Duration,
        schedule_type: ScheduleType,
    ) -> Result<()> {
        let period = schedule_type.signed_period()?;
        let now = self.inner.ctx.clock.now_millis();
        let at = TimeUtils::fire_time_after(now, delay)?;
        self.sched(task, at, period)
    }

    /// 在绝对时间点首次触发；时间已过则尽快触发
    pub fn schedule_at(
        &self,
        task: &TimerTask,
        at: DateTime<Utc>,
        schedule_type: ScheduleType,
    ) -> Result<()> {
        let period = schedule_type.signed_period()?;
        let at = TimeUtils::datetime_to_millis(at)?;
        self.sched(task, at, period)
    }

    /// 一次性任务
    pub fn schedule_once(&self, task: &TimerTask, delay: Duration) -> Result<()> {
        self.schedule(task, delay, ScheduleType::Once)
    }

    /// 固定频率：按计划时间推进，落后会连续补触发
    pub fn schedule_fixed_rate(
        &self,
        task: &TimerTask,
        delay: Duration,
        period: Duration,
    ) -> Result<()> {
        self.schedule(task, delay, ScheduleType::FixedRate(period))
    }

    /// 固定延时：按实际触发时间推进
    pub fn schedule_fixed_delay(
        &self,
        task: &TimerTask,
        delay: Duration,
        period: Duration,
    ) -> Result<()> {
        self.schedule(task, delay, ScheduleType::FixedDelay(period))
    }

    /// 入队
    ///
    /// 停机检查、任务状态流转和入队在同一次队列锁内完成。
    /// 只有新任务成为堆顶时才需要唤醒工作线程。
    fn sched(&self, task: &TimerTask, at: Millis, period: Millis) -> Result<()> {
        let ctx = &self.inner.ctx;
        let mut state = ctx.lock();
        if !state.new_tasks_may_be_scheduled {
            return Err(SchedulerError::SchedulerShutdown);
        }
        task.schedule(at, period)?;
        state.queue.insert(at, task.clone());

        let is_head = state
            .queue
            .peek_min()
            .is_some_and(|(_, head)| head.ptr_eq(task));
        if is_head {
            ctx.wakeup.notify_one();
        }
        trace!(
            "[Timer-{}] Task {} scheduled at {} (period {})",
            ctx.name,
            task.id(),
            at,
            period
        );
        Ok(())
    }

    /// 取消任务，等价于 [`TimerTask::cancel`]
    ///
    /// 任务留在队列里，直到工作线程在堆顶遇到它或者调用 [`purge`](Self::purge)。
    pub fn cancel(&self, task: &TimerTask) -> bool {
        task.cancel()
    }

    /// 清理队列中所有已取消的任务，返回清理数量
    pub fn purge(&self) -> usize {
        let ctx = &self.inner.ctx;
        // 出队的任务在解锁之后才 Drop
        let mut purged = Vec::new();
        {
            let mut state = ctx.lock();
            for i in (1..=state.queue.len()).rev() {
                let cancelled = state
                    .queue
                    .get(i)
                    .is_some_and(|(_, task)| task.state() == TaskState::Cancelled);
                if cancelled {
                    purged.extend(state.queue.quick_remove(i));
                }
            }
            if !purged.is_empty() {
                state.queue.reheapify();
            }
        }

        let removed = purged.len();
        if removed > 0 {
            ctx.metrics.add_purged(removed);
            debug!("[Timer-{}] Purged {} cancelled tasks.", ctx.name, removed);
        }
        removed
    }

    // ==========================================
    // 生命周期
    // ==========================================

    /// 优雅停机
    ///
    /// 立即拒绝新任务；已排队的任务仍然按时触发 (周期任务会一直触发，直到被取消)。
    /// 队列耗尽后工作线程退出。重复调用无副作用。
    pub fn shutdown(&self) {
        self.inner.ctx.terminate(false);
        debug!("[Timer-{}] Shutdown requested.", self.inner.ctx.name);
    }

    /// 强制停机
    ///
    /// 拒绝新任务并丢弃所有排队任务，返回丢弃数量。
    /// 正在执行的那一次不会被打断。被丢弃的任务保持 `Scheduled` 状态，不能再次调度。
    pub fn shutdown_now(&self) -> usize {
        let discarded = self.inner.ctx.terminate(true);
        debug!(
            "[Timer-{}] Forced shutdown, {} pending tasks discarded.",
            self.inner.ctx.name, discarded
        );
        discarded
    }

    /// 等待工作线程退出
    ///
    /// 没有先调用 `shutdown` 时会一直阻塞。在任务体内调用会返回 `InvalidState`。
    /// 只有第一次调用会真正 join，之后立即返回 `Ok`。
    pub fn wait_for_termination(&self) -> Result<()> {
        if thread::current().id() == self.inner.worker_id {
            return Err(SchedulerError::InvalidState(
                "wait_for_termination called from the timer's own worker thread".to_string(),
            ));
        }
        let Some(handle) = self.inner.handle.lock().take() else {
            return Ok(());
        };
        handle
            .join()
            .map_err(|payload| SchedulerError::WorkerAborted(panic_message(payload.as_ref())))
    }

    /// 是否已停止接收新任务
    pub fn is_shutdown(&self) -> bool {
        self.inner.ctx.is_shutdown()
    }

    /// 工作线程是否已经退出
    pub fn is_terminated(&self) -> bool {
        self.inner
            .handle
            .lock()
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }

    // ==========================================
    // 观测接口
    // ==========================================

    /// 队列中的任务数 (含尚未被清理的已取消任务)
    pub fn pending_count(&self) -> usize {
        self.inner.ctx.pending_count()
    }

    pub fn metrics(&self) -> Arc<DriverMetrics> {
        self.inner.ctx.metrics.clone()
    }

    /// 运行时统计快照
    pub fn stats(&self) -> SchedulerStats {
        let m = &self.inner.ctx.metrics;
        SchedulerStats {
            pending_tasks: self.pending_count(),
            running_tasks: m.active_tasks.load(Ordering::Relaxed),
            fired_count: m.total_fired.load(Ordering::Relaxed),
            completed_count: m.total_success.load(Ordering::Relaxed),
            failed_count: m.total_failure.load(Ordering::Relaxed),
            skipped_count: m.total_skipped.load(Ordering::Relaxed),
            purged_count: m.total_purged.load(Ordering::Relaxed),
            error_rate: m.error_rate(),
        }
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.inner.ctx.name)
            .field("shutdown", &self.is_shutdown())
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ManualClock;

    /// 时钟停在 0，任务永远不会到期，方便检查队列
    fn frozen_timer() -> Timer {
        Timer::builder()
            .with_clock(ManualClock::new(0))
            .build()
            .expect("build")
    }

    fn noop() -> TimerTask {
        TimerTask::from_fn(|_| Ok(()))
    }

    #[test]
    fn purge_removes_only_cancelled() {
        let timer = frozen_timer();
        let tasks: Vec<_> = (0..6).map(|_| noop()).collect();
        for (i, task) in tasks.iter().enumerate() {
            timer
                .schedule_once(task, Duration::from_secs(60 + i as u64))
                .expect("schedule");
        }
        for task in tasks.iter().step_by(2) {
            assert!(timer.cancel(task));
        }
        assert_eq!(timer.pending_count(), 6);
        assert_eq!(timer.purge(), 3);
        assert_eq!(timer.pending_count(), 3);
        assert_eq!(timer.purge(), 0);
        assert_eq!(timer.stats().purged_count, 3);

        {
            let state = timer.inner.ctx.lock();
            assert!(state.queue.is_heap());
        }
        assert_eq!(timer.shutdown_now(), 3);
        timer.wait_for_termination().expect("join");
    }

    #[test]
    fn rejects_after_shutdown() {
        let timer = frozen_timer();
        timer.shutdown();
        assert!(timer.is_shutdown());
        let task = noop();
        let err = timer.schedule_once(&task, Duration::ZERO);
        assert!(matches!(err, Err(SchedulerError::SchedulerShutdown)));
        assert_eq!(task.state(), TaskState::Virgin);
        timer.wait_for_termination().expect("join");
        assert!(timer.is_terminated());
    }

    #[test]
    fn rejects_bad_arguments() {
        let timer = frozen_timer();
        let task = noop();
        let zero = timer.schedule_fixed_rate(&task, Duration::ZERO, Duration::ZERO);
        assert!(matches!(zero, Err(SchedulerError::InvalidArgument(_))));

        let huge = timer.schedule_once(&task, Duration::MAX);
        assert!(matches!(huge, Err(SchedulerError::InvalidArgument(_))));

        let before_epoch = DateTime::<Utc>::from_timestamp(-1, 0).expect("timestamp");
        let early = timer.schedule_at(&task, before_epoch, ScheduleType::Once);
        assert!(matches!(early, Err(SchedulerError::InvalidArgument(_))));

        // 参数错误不会占用任务
        assert_eq!(task.state(), TaskState::Virgin);
        timer
            .schedule_once(&task, Duration::from_secs(1))
            .expect("schedule");
        timer.shutdown_now();
    }

    #[test]
    fn schedule_at_uses_absolute_time() {
        let timer = frozen_timer();
        let task = noop();
        let at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("timestamp");
        timer
            .schedule_at(&task, at, ScheduleType::FixedDelay(Duration::from_secs(5)))
            .expect("schedule");
        assert_eq!(task.next_fire_time(), 1_700_000_000_000);
        assert_eq!(task.period(), -5_000);
        timer.shutdown_now();
    }
}
