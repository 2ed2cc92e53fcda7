//! 虚拟时间事件队列
//! Virtual-time event queue
//!
//! 宿主用它调度突发定时器和会话停止定时器。取消是幂等的：已取消或已触发的
//! 定时器再次取消不会有任何效果。
//!
//! The host uses it to schedule burst timers and session stop timers.
//! Cancellation is idempotent: cancelling a timer that already fired or was
//! already cancelled has no effect.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tokio::time::Instant;

/// 定时器条目ID
/// Timer entry ID
pub type TimerEntryId = u64;

/// 到期的定时器条目
/// An expired timer entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEntry<E> {
    pub id: TimerEntryId,
    pub expiry_time: Instant,
    pub event: E,
}

/// 按到期时间排序的事件队列，同一时刻的事件按加入顺序触发
/// Event queue ordered by expiry; events due at the same instant fire in
/// insertion order.
#[derive(Debug)]
pub struct EventQueue<E> {
    heap: BinaryHeap<Reverse<(Instant, TimerEntryId)>>,
    pending: HashMap<TimerEntryId, E>,
    next_id: TimerEntryId,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加定时器
    /// Add a timer firing at `expiry_time`
    pub fn add_timer(&mut self, expiry_time: Instant, event: E) -> TimerEntryId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse((expiry_time, id)));
        self.pending.insert(id, event);
        id
    }

    /// 取消定时器，仅当定时器仍在等待时返回 `true`
    /// Cancel a timer. Returns `true` only if the timer was still pending.
    pub fn cancel_timer(&mut self, id: TimerEntryId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// 弹出下一个不晚于 `now` 到期的定时器
    /// Pop the next timer due at or before `now`
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerEntry<E>> {
        while let Some(Reverse((expiry_time, id))) = self.heap.peek().copied() {
            if !self.pending.contains_key(&id) {
                // cancelled
                self.heap.pop();
                continue;
            }
            if expiry_time > now {
                return None;
            }
            self.heap.pop();
            let event = self.pending.remove(&id)?;
            return Some(TimerEntry {
                id,
                expiry_time,
                event,
            });
        }
        None
    }

    /// 推进到 `now`，返回所有到期的定时器
    /// Advance to `now`, returning every expired timer
    pub fn advance(&mut self, now: Instant) -> Vec<TimerEntry<E>> {
        std::iter::from_fn(|| self.pop_expired(now)).collect()
    }

    /// 下一个等待中定时器的到期时间
    /// Expiry of the next pending timer
    pub fn next_expiry_time(&mut self) -> Option<Instant> {
        while let Some(Reverse((expiry_time, id))) = self.heap.peek().copied() {
            if self.pending.contains_key(&id) {
                return Some(expiry_time);
            }
            self.heap.pop();
        }
        None
    }

    pub fn timer_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// 持有至多一个已调度定时器的槽位，取消操作幂等
/// A slot holding at most one scheduled timer, with idempotent cancellation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimerSlot(Option<TimerEntryId>);

impl TimerSlot {
    pub fn set(&mut self, id: TimerEntryId) {
        self.0 = Some(id);
    }

    pub fn get(&self) -> Option<TimerEntryId> {
        self.0
    }

    /// 清空槽位但不取消定时器，在定时器触发时调用
    /// Empty the slot without cancelling, called when its timer fires
    pub fn clear(&mut self) {
        self.0 = None;
    }

    /// 取消槽位中的定时器。槽位为空时什么也不做
    /// Cancel the timer in the slot. Does nothing when the slot is empty.
    pub fn cancel<E>(&mut self, queue: &mut EventQueue<E>) -> bool {
        match self.0.take() {
            Some(id) => queue.cancel_timer(id),
            None => false,
        }
    }
}
