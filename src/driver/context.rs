use parking_lot::{Condvar, Mutex, MutexGuard};
use std::mem;
use std::sync::Arc;

use crate::{
    common::{Clock, SchedulerConfig, TimerTask},
    driver::DriverMetrics,
    queue::DeadlineQueue,
};

/// 受队列锁保护的共享状态
#[derive(Debug)]
pub(crate) struct QueueState {
    /// 待触发任务 (按下一次触发时间排序)
    pub(crate) queue: DeadlineQueue<TimerTask>,

    /// 是否还可能有新任务进来
    ///
    /// 变成 `false` 并且队列为空之后，工作线程永久退出。
    pub(crate) new_tasks_may_be_scheduled: bool,
}

impl QueueState {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: DeadlineQueue::with_capacity(capacity),
            new_tasks_may_be_scheduled: true,
        }
    }
}

/// 驱动器上下文 (Driver Context)
///
/// **职责**:
/// 打包工作线程运行所需的全部共享资源：队列、唤醒条件变量、时钟、配置和指标。
///
/// **所有权**:
/// 工作线程和 `Timer` 门面各持有一个 `Arc<DriverContext>`，但上下文本身不引用门面，
/// 引用图保持无环。门面全部被 Drop 后，工作线程依然可以把剩余任务跑完再退出。
pub struct DriverContext {
    /// 工作线程名 (也用于日志)
    pub name: String,

    /// 队列 + 停机标志，由同一把锁保护
    pub(crate) state: Mutex<QueueState>,

    /// 工作线程在这里等待：队列为空，或者堆顶还没到期
    pub(crate) wakeup: Condvar,

    /// 时钟
    pub clock: Arc<dyn Clock>,

    /// 全局配置
    pub config: Arc<SchedulerConfig>,

    /// 全局统计指标
    pub metrics: Arc<DriverMetrics>,
}

impl DriverContext {
    /// 创建一个新的驱动器上下文
    pub fn new(
        name: String,
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<DriverMetrics>,
    ) -> Self {
        let capacity = config.worker.queue_capacity;
        Self {
            name,
            state: Mutex::new(QueueState::new(capacity)),
            wakeup: Condvar::new(),
            clock,
            config: Arc::new(config),
            metrics,
        }
    }

    /// 是否已经停止接收新任务
    pub fn is_shutdown(&self) -> bool {
        !self.state.lock().new_tasks_may_be_scheduled
    }

    /// 队列中的任务数
    pub fn pending_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock()
    }

    /// 停止接收新任务并唤醒工作线程
    ///
    /// - `discard = false`: 已排队的任务继续按时触发，跑完后线程退出。
    /// - `discard = true`: 同时清空队列，返回被丢弃的任务数。
    ///
    /// 被丢弃的任务在释放队列锁之后才 Drop：任务闭包可能持有最后一个 `Timer` 句柄，
    /// 而 `Timer` 的 Drop 会再次获取队列锁。
    pub(crate) fn terminate(&self, discard: bool) -> usize {
        let discarded = {
            let mut state = self.lock();
            state.new_tasks_may_be_scheduled = false;
            self.wakeup.notify_all();
            discard.then(|| mem::take(&mut state.queue))
        };
        discarded.map_or(0, |queue| queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ManualClock, SchedulableTask, TaskContext, TimerTask};
    use std::sync::mpsc;

    /// Drop 时读取队列长度，模拟任务闭包里持有的 `Timer` 句柄
    struct ReadsQueueOnDrop {
        ctx: Arc<DriverContext>,
        seen: mpsc::Sender<usize>,
    }

    impl Drop for ReadsQueueOnDrop {
        fn drop(&mut self) {
            let _ = self.seen.send(self.ctx.pending_count());
        }
    }

    struct HoldsReader(#[allow(dead_code)] ReadsQueueOnDrop);

    impl SchedulableTask for HoldsReader {
        fn execute(&self, _ctx: &TaskContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn discarded_tasks_are_released_after_unlock() {
        let ctx = Arc::new(DriverContext::new(
            "ctx-test".into(),
            SchedulerConfig::default(),
            Arc::new(ManualClock::new(0)),
            Arc::new(DriverMetrics::default()),
        ));
        let (tx, rx) = mpsc::channel();
        let task = TimerTask::new(HoldsReader(ReadsQueueOnDrop {
            ctx: ctx.clone(),
            seen: tx,
        }));
        {
            let mut state = ctx.lock();
            task.schedule(1_000, 0).expect("schedule");
            state.queue.insert(1_000, task);
        }

        assert_eq!(ctx.terminate(true), 1);
        assert_eq!(rx.try_recv().ok(), Some(0));
        assert!(ctx.is_shutdown());
        assert_eq!(ctx.terminate(true), 0);
    }
}
