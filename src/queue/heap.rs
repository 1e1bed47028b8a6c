use crate::common::Millis;

/// 堆节点: 排序键 + 元素
///
/// 排序键和元素分开存放，堆操作只读键，不需要碰元素内部的锁。
#[derive(Debug)]
struct Slot<T> {
    deadline: Millis,
    item: T,
}

/// 截止时间队列 (二叉小顶堆)
///
/// 逻辑上从 1 开始编号：节点 `i` 的子节点是 `2i` 和 `2i+1`，最小值永远在 1 号位。
/// 物理上 `slots[i - 1]` 存放 `i` 号节点。
///
/// **注意**: 本身不做同步，所有调用方必须持有同一把队列锁。
/// 截止时间相同的元素之间不保证先后顺序。
#[derive(Debug)]
pub struct DeadlineQueue<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Default for DeadlineQueue<T> {
    fn default() -> Self {
        Self::with_capacity(128)
    }
}

impl<T> DeadlineQueue<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// 入队: 追加到末尾，再向上调整
    pub fn insert(&mut self, deadline: Millis, item: T) {
        // 写满时翻倍扩容
        if self.slots.len() == self.slots.capacity() {
            self.slots.reserve_exact(self.slots.capacity().max(1));
        }
        self.slots.push(Slot { deadline, item });
        self.fix_up(self.slots.len());
    }

    /// 查看堆顶 (最早到期) 元素
    pub fn peek_min(&self) -> Option<(Millis, &T)> {
        self.get(1)
    }

    /// 按逻辑编号 (1..=len) 读取元素
    pub fn get(&self, i: usize) -> Option<(Millis, &T)> {
        let slot = self.slots.get(i.checked_sub(1)?)?;
        Some((slot.deadline, &slot.item))
    }

    /// 移除堆顶: 末尾元素放到 1 号位，再向下调整
    pub fn remove_min(&mut self) -> Option<T> {
        if self.slots.is_empty() {
            return None;
        }
        let removed = self.slots.swap_remove(0);
        self.fix_down(1);
        Some(removed.item)
    }

    /// 重设堆顶的截止时间并向下调整
    ///
    /// 前提: 新时间不早于旧时间 (周期任务只会往后推)，所以只需要下沉。
    pub fn reschedule_min(&mut self, new_time: Millis) {
        let Some(head) = self.slots.first_mut() else {
            return;
        };
        debug_assert!(new_time >= head.deadline, "head may only move later");
        head.deadline = new_time;
        self.fix_down(1);
    }

    /// 快速移除 `i` 号元素: 末尾元素直接填坑，**不**恢复堆序
    ///
    /// 调用方在一批移除之后必须调用 [`reheapify`](Self::reheapify)。
    /// 从大编号往小编号遍历时，填进来的元素都已经遍历过。
    pub fn quick_remove(&mut self, i: usize) -> Option<T> {
        let index = i.checked_sub(1)?;
        if index >= self.slots.len() {
            return None;
        }
        Some(self.slots.swap_remove(index).item)
    }

    /// 从任意顺序恢复堆序 O(n)
    pub fn reheapify(&mut self) {
        for i in (1..=self.slots.len() / 2).rev() {
            self.fix_down(i);
        }
    }

    /// 清空并释放所有元素引用
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// 检查堆序: 每个节点不晚于它的子节点
    pub fn is_heap(&self) -> bool {
        (2..=self.slots.len()).all(|i| self.key(i / 2) <= self.key(i))
    }

    fn key(&self, i: usize) -> Millis {
        self.slots[i - 1].deadline
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.slots.swap(a - 1, b - 1);
    }

    /// 从 `k` 开始向【上】寻找位置
    fn fix_up(&mut self, mut k: usize) {
        while k > 1 {
            let parent = k >> 1;
            if self.key(k) >= self.key(parent) {
                break;
            }
            self.swap(k, parent);
            k = parent;
        }
    }

    /// 从 `k` 开始向【下】寻找位置，每次和较小的子节点交换
    fn fix_down(&mut self, mut k: usize) {
        let size = self.slots.len();
        loop {
            let Some(mut child) = k.checked_mul(2).filter(|&c| c <= size) else {
                break;
            };
            if child < size && self.key(child) > self.key(child + 1) {
                child += 1;
            }
            if self.key(k) <= self.key(child) {
                break;
            }
            self.swap(k, child);
            k = child;
        }
    }
}
