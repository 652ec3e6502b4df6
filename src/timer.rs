//! 可取消的截止时间队列
//! Cancellable deadline queue
//!
//! 管理器的所有定时需求（周期性回收、节流后的连接、退役排空）都注册在
//! 这里，由actor的事件循环驱动。取消是确定性的：被取消的条目永远不会触发。
//!
//! Every timing need of the manager (periodic recycle, throttled connect,
//! retirement drain) is registered here and driven by the actor's event loop.
//! Cancellation is deterministic: a cancelled entry never fires.

use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;
use tracing::trace;

/// 定时器条目ID，用于取消已注册的定时器
/// Timer entry ID, used to cancel a registered timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TimerEntryId(u64);

/// 按到期时间排序的定时器队列
/// Timer queue ordered by expiration time
#[derive(Debug)]
pub(crate) struct TimerQueue<E> {
    /// 到期时间相同的条目按注册顺序触发
    /// Entries with the same expiry fire in registration order
    entries: BTreeMap<(Instant, TimerEntryId), E>,
    expiries: HashMap<TimerEntryId, Instant>,
    next_id: u64,
}

impl<E> TimerQueue<E> {
    /// 创建空队列
    /// Create an empty queue
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            expiries: HashMap::new(),
            next_id: 0,
        }
    }

    /// 注册一个在 `deadline` 触发的事件
    /// Register an event firing at `deadline`
    pub(crate) fn schedule(&mut self, deadline: Instant, event: E) -> TimerEntryId {
        let id = TimerEntryId(self.next_id);
        self.next_id += 1;
        self.entries.insert((deadline, id), event);
        self.expiries.insert(id, deadline);
        trace!(timer_id = id.0, "Timer scheduled");
        id
    }

    /// 取消定时器，返回其事件（如果仍未触发）
    /// Cancel a timer, returning its event if it had not fired yet
    pub(crate) fn cancel(&mut self, id: TimerEntryId) -> Option<E> {
        let deadline = self.expiries.remove(&id)?;
        trace!(timer_id = id.0, "Timer cancelled");
        self.entries.remove(&(deadline, id))
    }

    /// 最早的到期时间
    /// Earliest expiration time
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// 弹出一个在 `now` 或之前到期的事件
    /// Pop one event expiring at or before `now`
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<E> {
        let key = *self.entries.keys().next()?;
        if key.0 > now {
            return None;
        }
        self.expiries.remove(&key.1);
        self.entries.remove(&key)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}
