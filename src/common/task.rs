use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

use crate::common::time::MAX_PERIOD_MILLIS;
use crate::common::traits::FnTask;
use crate::common::{
    Millis, Result, SchedulableTask, SchedulerError, TaskContext, TaskState, new_task_id,
};

/// 受任务锁保护的可变部分
///
/// 锁顺序: 队列锁在外，任务锁在内。任何地方都不允许反过来获取。
#[derive(Debug)]
pub(crate) struct TaskSlot {
    pub(crate) state: TaskState,
    /// 下一次触发时间，和队列里的排序键保持一致
    pub(crate) next_fire_time: Millis,
    /// 0 = 一次性；正数 = 固定频率；负数 = 固定延时
    pub(crate) period: Millis,
}

struct TaskInner {
    id: String,
    slot: Mutex<TaskSlot>,
    handler: Box<dyn SchedulableTask>,
}

/// 定时任务
///
/// 廉价可克隆的句柄 (内部是 `Arc`)，所有克隆指向同一个任务。
/// 一个任务只能被调度一次；想再次执行，请创建新任务。
#[derive(Clone)]
pub struct TimerTask {
    inner: Arc<TaskInner>,
}

impl TimerTask {
    /// 用实现了 [`SchedulableTask`] 的类型创建任务
    pub fn new<H: SchedulableTask>(handler: H) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                id: new_task_id(),
                slot: Mutex::new(TaskSlot {
                    state: TaskState::Virgin,
                    next_fire_time: 0,
                    period: 0,
                }),
                handler: Box::new(handler),
            }),
        }
    }

    /// 用闭包创建任务
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&TaskContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new(FnTask(f))
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn state(&self) -> TaskState {
        self.inner.slot.lock().state
    }

    /// 带符号周期 (毫秒)，未调度前为 0
    pub fn period(&self) -> Millis {
        self.inner.slot.lock().period
    }

    /// 下一次触发时间，未调度前为 0
    pub fn next_fire_time(&self) -> Millis {
        self.inner.slot.lock().next_fire_time
    }

    /// 取消任务
    ///
    /// 返回 `true` 表示确实阻止了至少一次未来的触发 (取消前处于 `Scheduled`)。
    /// 已经开始执行的那一次不受影响。可以在任务体内部调用，重复调用返回 `false`。
    pub fn cancel(&self) -> bool {
        let mut slot = self.inner.slot.lock();
        let result = slot.state == TaskState::Scheduled;
        slot.state = TaskState::Cancelled;
        result
    }

    /// 最近一次触发对应的计划时间
    ///
    /// 通常在任务体内调用，用来判断本次执行是否已经太晚。
    /// 在第一次触发之前调用，返回值没有意义。
    pub fn scheduled_execution_time(&self) -> Millis {
        let slot = self.inner.slot.lock();
        if slot.period < 0 {
            slot.next_fire_time + slot.period
        } else {
            slot.next_fire_time - slot.period
        }
    }

    /// 两个句柄是否指向同一个任务
    pub fn ptr_eq(&self, other: &TimerTask) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// `Virgin -> Scheduled`
    ///
    /// 调用方必须持有队列锁。
    pub(crate) fn schedule(&self, at: Millis, period: Millis) -> Result<()> {
        if at < 0 {
            return Err(SchedulerError::InvalidArgument(format!(
                "Illegal execution time: {}",
                at
            )));
        }
        if period.unsigned_abs() > MAX_PERIOD_MILLIS.unsigned_abs() {
            return Err(SchedulerError::InvalidArgument(format!(
                "Period out of range: {}",
                period
            )));
        }

        let mut slot = self.inner.slot.lock();
        if slot.state != TaskState::Virgin {
            return Err(SchedulerError::InvalidState(format!(
                "Task {} already scheduled or cancelled ({:?})",
                self.inner.id, slot.state
            )));
        }
        slot.next_fire_time = at;
        slot.period = period;
        slot.state = TaskState::Scheduled;
        Ok(())
    }

    /// 获取任务锁 (仅限工作线程在持有队列锁时使用)
    pub(crate) fn lock(&self) -> MutexGuard<'_, TaskSlot> {
        self.inner.slot.lock()
    }

    /// 执行任务体，调用方不能持有任何锁
    pub(crate) fn run(&self, ctx: &TaskContext) -> anyhow::Result<()> {
        self.inner.handler.execute(ctx)
    }
}

impl fmt::Debug for TimerTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.slot.lock();
        f.debug_struct("TimerTask")
            .field("id", &self.inner.id)
            .field("state", &slot.state)
            .field("next_fire_time", &slot.next_fire_time)
            .field("period", &slot.period)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TimerTask {
        TimerTask::from_fn(|_| Ok(()))
    }

    #[test]
    fn schedule_only_from_virgin() {
        let task = noop();
        assert_eq!(task.state(), TaskState::Virgin);
        task.schedule(100, 0).expect("first schedule");
        assert_eq!(task.state(), TaskState::Scheduled);
        assert_eq!(task.next_fire_time(), 100);

        let err = task.schedule(200, 0);
        assert!(matches!(err, Err(SchedulerError::InvalidState(_))));
        // 失败的调度不应改动任何字段
        assert_eq!(task.next_fire_time(), 100);
    }

    #[test]
    fn cancelled_task_cannot_be_scheduled() {
        let task = noop();
        assert!(!task.cancel());
        assert!(matches!(
            task.schedule(0, 0),
            Err(SchedulerError::InvalidState(_))
        ));
    }

    #[test]
    fn invalid_arguments_leave_task_virgin() {
        let task = noop();
        assert!(matches!(
            task.schedule(-1, 0),
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert!(matches!(
            task.schedule(0, i64::MIN),
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert_eq!(task.state(), TaskState::Virgin);
    }

    #[test]
    fn cancel_is_idempotent() {
        let task = noop();
        task.schedule(10, 5).expect("schedule");
        assert!(task.cancel());
        assert!(!task.cancel());
        assert_eq!(task.state(), TaskState::Cancelled);
    }

    #[test]
    fn scheduled_execution_time_per_policy() {
        let rate = noop();
        rate.schedule(300, 100).expect("schedule");
        assert_eq!(rate.scheduled_execution_time(), 200);

        let delay = noop();
        delay.schedule(230, -100).expect("schedule");
        assert_eq!(delay.scheduled_execution_time(), 130);

        let once = noop();
        once.schedule(50, 0).expect("schedule");
        assert_eq!(once.scheduled_execution_time(), 50);
    }

    #[test]
    fn clones_share_identity() {
        let a = noop();
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.id(), b.id());
        assert!(!a.ptr_eq(&noop()));
        b.schedule(1, 0).expect("schedule");
        assert_eq!(a.state(), TaskState::Scheduled);
    }
}
