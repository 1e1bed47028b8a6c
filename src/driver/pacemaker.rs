use parking_lot::MutexGuard;
use tracing::trace;

use crate::{
    common::{Millis, TaskState, TimeUtils, TimerTask},
    driver::context::{DriverContext, QueueState},
};

/// 一次到期的触发
#[derive(Debug)]
pub(crate) struct FiredTask {
    pub task: TimerTask,
    /// 本次触发对应的计划时间
    pub scheduled_time: Millis,
    /// 判定到期时的时钟读数
    pub fired_at: Millis,
}

/// 等待决策
///
/// 每次检查堆顶后得出的下一步动作。
#[derive(Debug)]
pub(crate) enum WaitDecision {
    /// 堆顶到期，已出队或已重新排期，需要立即执行
    Fire(FiredTask),

    /// 堆顶已被取消，已出队，继续检查下一个
    Skip(TimerTask),

    /// 堆顶还没到期：最多睡到这个时间点，期间允许被唤醒
    WaitUntil(Millis),

    /// 队列为空：一直等到有新任务或停机
    WaitIndefinitely,

    /// 队列为空且不会再有新任务：退出
    Terminate,
}

impl QueueState {
    /// 检查堆顶并决定下一步
    ///
    /// 调用方持有队列锁；堆顶任务的状态在任务锁下读取 (队列锁在外，任务锁在内)，
    /// 这样与并发的 `cancel()` 不会出现竞态。
    pub(crate) fn poll(&mut self, now: Millis) -> WaitDecision {
        let Some((execution_time, head)) = self
            .queue
            .peek_min()
            .map(|(deadline, task)| (deadline, task.clone()))
        else {
            return if self.new_tasks_may_be_scheduled {
                WaitDecision::WaitIndefinitely
            } else {
                WaitDecision::Terminate
            };
        };

        let mut slot = head.lock();
        if slot.state == TaskState::Cancelled {
            self.queue.remove_min();
            drop(slot);
            return WaitDecision::Skip(head);
        }

        if execution_time > now {
            return WaitDecision::WaitUntil(execution_time);
        }

        if slot.period == 0 {
            // 一次性任务：出队，进入终态
            self.queue.remove_min();
            slot.state = TaskState::Executed;
        } else {
            // 周期任务：留在队列里，改期后下沉
            let next = TimeUtils::next_recurrence_time(execution_time, slot.period, now);
            self.queue.reschedule_min(next);
            slot.next_fire_time = next;
        }
        drop(slot);

        WaitDecision::Fire(FiredTask {
            task: head,
            scheduled_time: execution_time,
            fired_at: now,
        })
    }
}

/// 起搏器产生的事件
#[derive(Debug)]
pub(crate) enum PacemakerEvent {
    /// [触发] 有任务到期，请立即执行 (此时已不持有任何锁)
    Trigger(FiredTask),
    /// [关闭] 队列已空且不会再有新任务
    Shutdown,
}

/// 任务起搏器
///
/// 核心职责：在队列锁上睡眠，直到堆顶到期、新任务插到更早的位置或停机。
/// 每次醒来 (包括虚假唤醒) 都重新检查队列，而不是相信睡眠本身。
pub(crate) struct TaskPacemaker<'a> {
    ctx: &'a DriverContext,
}

impl<'a> TaskPacemaker<'a> {
    pub(crate) fn new(ctx: &'a DriverContext) -> Self {
        Self { ctx }
    }

    /// 等待下一次触发
    pub(crate) fn wait_next(&mut self) -> PacemakerEvent {
        let mut state = self.ctx.lock();
        loop {
            let now = self.ctx.clock.now_millis();
            match state.poll(now) {
                WaitDecision::Fire(fired) => return PacemakerEvent::Trigger(fired),
                WaitDecision::Skip(task) => {
                    self.ctx.metrics.inc_skipped();
                    trace!("[Driver] Dropped cancelled task {}", task.id());
                    // 可能是最后一个引用，闭包里的 `Timer` 句柄 Drop 时会重新加锁
                    MutexGuard::unlocked(&mut state, || drop(task));
                }
                // 软等待：到点或被 Timer 唤醒，哪个先到算哪个
                WaitDecision::WaitUntil(deadline) => {
                    let timeout = TimeUtils::wait_duration(deadline, now);
                    let _ = self.ctx.wakeup.wait_for(&mut state, timeout);
                }
                WaitDecision::WaitIndefinitely => self.ctx.wakeup.wait(&mut state),
                WaitDecision::Terminate => return PacemakerEvent::Shutdown,
            }
        }
    }
}
