//! 定义了单个受管理的传输连接。
//! Defines a single managed transport connection.
//!
//! A `Connection` is a cheap, cloneable handle. Its state only ever changes on
//! the manager's event loop; everyone else observes it through
//! [`Connection::state`], [`Connection::subscribe`], [`Connection::retiring`]
//! and [`Connection::finished`].
//!
//! `Connection` 是一个廉价、可克隆的句柄。它的状态只会在管理器的事件循环中改变；
//! 其他各方通过 [`Connection::state`]、[`Connection::subscribe`]、
//! [`Connection::retiring`] 和 [`Connection::finished`] 观察它。

mod state;

#[cfg(test)]
mod tests;

pub use state::{ConnectionEvent, ConnectionState};

use crate::{manager::command::ManagerCommand, transport::TransportHandle};
use std::{fmt, sync::Arc};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 16;

/// Identifier of a connection, unique within its manager.
///
/// 连接的标识符，在其管理器内唯一。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the state watch carries: the state and, while live, the handle.
struct Slot<H> {
    state: ConnectionState,
    handle: Option<Arc<H>>,
}

struct Inner<H> {
    id: ConnectionId,
    slot: watch::Sender<Slot<H>>,
    events: broadcast::Sender<ConnectionEvent>,
    /// Non-owning: a connection never keeps its manager alive.
    manager: mpsc::WeakSender<ManagerCommand>,
}

/// One transport session and its lifecycle.
///
/// 一个传输会话及其生命周期。
pub struct Connection<H: TransportHandle> {
    inner: Arc<Inner<H>>,
}

impl<H: TransportHandle> Clone for Connection<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: TransportHandle> PartialEq for Connection<H> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<H: TransportHandle> Eq for Connection<H> {}

impl<H: TransportHandle> fmt::Debug for Connection<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl<H: TransportHandle> Connection<H> {
    /// Creates a connection in the `Waiting` state.
    pub(crate) fn new(id: ConnectionId, manager: mpsc::WeakSender<ManagerCommand>) -> Self {
        let (slot, _) = watch::channel(Slot {
            state: ConnectionState::Waiting,
            handle: None,
        });
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        debug!(conn_id = %id, "waiting");
        Self {
            inner: Arc::new(Inner {
                id,
                slot,
                events,
                manager,
            }),
        }
    }

    /// This connection's identifier.
    /// 此连接的标识符。
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// The current lifecycle state.
    /// 当前生命周期状态。
    pub fn state(&self) -> ConnectionState {
        self.inner.slot.borrow().state
    }

    /// The live transport handle, present from `Connected` until `Finished`.
    ///
    /// 活动的传输句柄，从 `Connected` 到 `Finished` 之前存在。
    pub fn transport(&self) -> Option<Arc<H>> {
        self.inner.slot.borrow().handle.clone()
    }

    /// Subscribes to this connection's lifecycle events.
    ///
    /// Only events emitted after the call are delivered; check
    /// [`Connection::state`] for what already happened.
    ///
    /// 订阅此连接的生命周期事件。
    ///
    /// 只会收到调用之后发出的事件；已发生的情况请查看 [`Connection::state`]。
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Completes once the connection is retiring (or already finished).
    ///
    /// 一旦连接进入退役（或已结束）即完成。
    pub async fn retiring(&self) {
        self.wait_for_state(ConnectionState::Retiring).await;
    }

    /// Completes once the connection is finished.
    ///
    /// 一旦连接结束即完成。
    pub async fn finished(&self) {
        self.wait_for_state(ConnectionState::Finished).await;
    }

    async fn wait_for_state(&self, target: ConnectionState) {
        let mut rx = self.inner.slot.subscribe();
        // The sender lives in `self.inner`, so the watch cannot close under us.
        let _ = rx.wait_for(|slot| slot.state >= target).await;
    }

    /// Reports that this connection is broken.
    ///
    /// Ignored once the connection is retiring or finished. Otherwise the
    /// manager retires it and starts a replacement.
    ///
    /// 报告此连接已损坏。
    ///
    /// 一旦连接处于退役或结束状态则忽略。否则管理器会将其退役并启动替代连接。
    pub async fn failed(&self) {
        if self.state().is_retired() {
            return;
        }
        debug!(conn_id = %self.id(), "failed");
        self.send_to_manager(ManagerCommand::ConnectionFailed { id: self.id() })
            .await;
    }

    /// Asks the manager to retire this connection.
    ///
    /// While the manager is running, retiring the live head also queues a
    /// replacement, exactly as `recycle()` does.
    ///
    /// 请求管理器将此连接退役。
    ///
    /// 管理器运行期间，退役当前头部连接会像 `recycle()` 一样排入替代连接。
    pub async fn retire(&self) {
        if self.state().is_retired() {
            return;
        }
        self.send_to_manager(ManagerCommand::Retire { id: self.id() })
            .await;
    }

    async fn send_to_manager(&self, command: ManagerCommand) {
        match self.inner.manager.upgrade() {
            Some(tx) => {
                if tx.send(command).await.is_err() {
                    debug!(conn_id = %self.id(), "manager is gone, ignoring");
                }
            }
            None => debug!(conn_id = %self.id(), "manager is gone, ignoring"),
        }
    }

    // --- Transitions, driven only by the manager's event loop ---

    /// Moves to `next` if the transition is legal, applying `update` to the slot.
    fn transition(&self, next: ConnectionState, update: impl FnOnce(&mut Slot<H>)) -> bool {
        let id = self.inner.id;
        let moved = self.inner.slot.send_if_modified(|slot| {
            if !slot.state.can_transition_to(next) {
                return false;
            }
            debug!(conn_id = %id, from = %slot.state, to = %next, "state transition");
            slot.state = next;
            update(slot);
            true
        });
        if !moved {
            let current = self.state();
            if current != next && !current.is_retired() {
                warn!(conn_id = %id, state = %current, attempted = %next, "invalid state transition refused");
            }
        }
        moved
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }

    /// `Waiting → Connecting`. Returns false if a connect is not appropriate.
    pub(crate) fn begin_connecting(&self) -> bool {
        self.transition(ConnectionState::Connecting, |_| {})
    }

    /// `Connecting → Connected`, installing the handle. Returns false when the
    /// connection was retired while the handshake was in flight; the caller
    /// then owns the handle and must close it.
    pub(crate) fn install(&self, handle: Arc<H>) -> bool {
        let installed = self.transition(ConnectionState::Connected, |slot| {
            slot.handle = Some(handle);
        });
        if installed {
            self.emit(ConnectionEvent::Connected);
        }
        installed
    }

    /// Any live state `→ Retiring`. Returns false if already retiring or finished.
    pub(crate) fn begin_retiring(&self) -> bool {
        let retiring = self.transition(ConnectionState::Retiring, |_| {});
        if retiring {
            self.emit(ConnectionEvent::Retiring);
        }
        retiring
    }

    /// `Retiring → Finished`, handing back the handle for closing.
    pub(crate) fn finish(&self) -> Option<Arc<H>> {
        let mut handle = None;
        let finished = self.transition(ConnectionState::Finished, |slot| {
            handle = slot.handle.take();
        });
        if finished {
            self.emit(ConnectionEvent::Finished);
        }
        handle
    }
}
