//! 客户端管理器：连接池与回收调度器的公共句柄。
//! The client manager: the public handle in front of the pool and the recycle
//! scheduler.
//!
//! A [`ClientManager`] keeps one live [`Connection`] at a time and replaces it
//! periodically, on failure, or on request. The replaced connection is not
//! closed right away: it is *retired* and stays open for
//! [`Config::retirement_delay`](crate::config::Config::retirement_delay) so that
//! in-flight work can complete while the new connection takes over.
//!
//! [`ClientManager`] 同一时间保持一个活动的 [`Connection`]，并周期性地、在失败时
//! 或按请求替换它。被替换的连接不会立即关闭：它会被*退役*并保持打开一段时间，
//! 以便在新连接接管时完成进行中的工作。

mod actor;
mod builder;
pub(crate) mod command;


pub use builder::ClientManagerBuilder;

use crate::{
    channel::with_scoped_channel,
    connection::{Connection, ConnectionId, ConnectionState},
    error::{Error, Result},
    naming,
    transport::{ChannelKind, ChannelOf, Transport, TransportHandle},
};
use command::ManagerCommand;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, oneshot, watch,
};
use tracing::warn;

/// A handle to a running connection manager.
///
/// Cloning is cheap; all clones talk to the same manager. When the last handle
/// is dropped the manager stops, drains its connections and exits.
///
/// 运行中的连接管理器的句柄。
///
/// 克隆开销很小；所有克隆都与同一个管理器通信。最后一个句柄被释放时，
/// 管理器会停止、排空其连接并退出。
pub struct ClientManager<T: Transport> {
    command_tx: mpsc::Sender<ManagerCommand>,
    active_rx: watch::Receiver<Option<Connection<T::Handle>>>,
    namespace_rx: watch::Receiver<Option<String>>,
    connected_tx: broadcast::Sender<Connection<T::Handle>>,
}

impl<T: Transport> Clone for ClientManager<T> {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            active_rx: self.active_rx.clone(),
            namespace_rx: self.namespace_rx.clone(),
            connected_tx: self.connected_tx.clone(),
        }
    }
}

impl<T: Transport> std::fmt::Debug for ClientManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("active", &*self.active_rx.borrow())
            .field("namespace", &*self.namespace_rx.borrow())
            .finish()
    }
}

impl<T: Transport> ClientManager<T> {
    /// Starts connecting and schedules the periodic recycle.
    ///
    /// Fails with [`Error::AlreadyRunning`] if already started, or with
    /// [`Error::ShuttingDown`] while a previous [`stop`](Self::stop) is still
    /// draining.
    ///
    /// 开始连接并安排周期性回收。
    pub async fn start(&self) -> Result<()> {
        self.request(|response_tx| ManagerCommand::Start { response_tx })
            .await?
    }

    /// Retires every connection without replacement and resolves once all of
    /// them have finished.
    ///
    /// Fails with [`Error::NotRunning`] if the manager is not running.
    ///
    /// 退役所有连接且不替换，并在它们全部结束后返回。
    pub async fn stop(&self) -> Result<()> {
        self.request(|response_tx| ManagerCommand::Stop { response_tx })
            .await?
    }

    /// Retires the current connection and, if running, starts a new one.
    ///
    /// 退役当前连接，并在运行时启动一个新连接。
    pub async fn recycle(&self) -> Result<()> {
        self.command_tx
            .send(ManagerCommand::Recycle)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// The connection new work should use: the newest one, if the manager is
    /// running and it is `Connected`.
    ///
    /// 新工作应使用的连接：当管理器运行且最新连接处于 `Connected` 时返回它。
    pub fn active_connection(&self) -> Option<Connection<T::Handle>> {
        self.active_rx.borrow().clone()
    }

    /// Waits for an active connection.
    ///
    /// 等待一个活动连接。
    pub async fn connection(&self) -> Result<Connection<T::Handle>> {
        let mut active_rx = self.active_rx.clone();
        let active = active_rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::ChannelClosed)?;
        (*active).clone().ok_or(Error::NotConnected)
    }

    /// Runs `f` with the active connection, waiting for one if needed.
    ///
    /// Errors from `f` are returned as they are and never retried.
    ///
    /// 使用活动连接运行 `f`，必要时等待连接就绪。`f` 的错误原样返回，不会重试。
    pub async fn with_connection<F, R, E>(&self, f: F) -> std::result::Result<R, E>
    where
        F: AsyncFnOnce(Connection<T::Handle>) -> std::result::Result<R, E>,
        E: From<Error>,
    {
        let connection = self.connection().await?;
        f(connection).await
    }

    /// Runs `f` with a fresh channel on the active connection.
    ///
    /// A channel error while `f` runs is treated as fatal for the connection.
    /// The channel is always closed afterwards.
    ///
    /// 在活动连接上使用新通道运行 `f`。`f` 运行期间的通道错误被视为连接致命错误；
    /// 之后通道总会被关闭。
    pub async fn with_channel<F, R, E>(&self, kind: ChannelKind, f: F) -> std::result::Result<R, E>
    where
        F: AsyncFnOnce(&ChannelOf<T>) -> std::result::Result<R, E>,
        E: From<Error>,
    {
        let connection = self.connection().await?;
        with_scoped_channel(&connection, kind, f).await
    }

    /// Subscribes to connections as they become connected.
    ///
    /// 订阅新建立的连接。
    pub fn connected_events(&self) -> broadcast::Receiver<Connection<T::Handle>> {
        self.connected_tx.subscribe()
    }

    /// Like [`connected_events`](Self::connected_events), but yields the
    /// current active connection first.
    ///
    /// Use this to (re)declare consumers: every yielded connection needs the
    /// per-connection setup done again.
    ///
    /// 与 [`connected_events`](Self::connected_events) 类似，但会先返回当前的活动连接。
    pub fn on_connected(&self) -> ConnectedEvents<T::Handle> {
        let rx = self.connected_tx.subscribe();
        ConnectedEvents {
            pending: self.active_connection(),
            last: None,
            rx,
        }
    }

    /// The namespace of the most recently fetched credentials.
    /// 最近获取的凭据所属的命名空间。
    pub fn namespace(&self) -> Option<String> {
        self.namespace_rx.borrow().clone()
    }

    /// Builds `<kind>/<namespace>/<name>` using the current namespace.
    ///
    /// 使用当前命名空间构建 `<kind>/<namespace>/<name>`。
    pub fn full_object_name(&self, kind: &str, name: &str) -> Result<String> {
        let namespace = self.namespace_rx.borrow();
        naming::full_object_name(kind, namespace.as_deref(), name)
    }

    /// A snapshot of the pool, newest connection first.
    ///
    /// 连接池快照，最新的连接在前。
    pub async fn pool_states(&self) -> Result<Vec<(ConnectionId, ConnectionState)>> {
        self.request(|response_tx| ManagerCommand::PoolStates { response_tx })
            .await
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> ManagerCommand,
    ) -> Result<R> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(command(response_tx))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        response_rx.await.map_err(|_| Error::ChannelClosed)
    }
}

/// A stream of connected connections, starting with the current one.
///
/// 已建立连接的流，从当前连接开始。
pub struct ConnectedEvents<H: TransportHandle> {
    pending: Option<Connection<H>>,
    last: Option<ConnectionId>,
    rx: broadcast::Receiver<Connection<H>>,
}

impl<H: TransportHandle> ConnectedEvents<H> {
    /// Waits for the next connection that needs setting up.
    ///
    /// Fails with [`Error::ChannelClosed`] once the manager is gone.
    ///
    /// 等待下一个需要初始化的连接。管理器退出后返回 [`Error::ChannelClosed`]。
    pub async fn recv(&mut self) -> Result<Connection<H>> {
        if let Some(connection) = self.pending.take() {
            self.last = Some(connection.id());
            return Ok(connection);
        }
        loop {
            match self.rx.recv().await {
                // Connected before we subscribed and already yielded as pending.
                Ok(connection) if Some(connection.id()) == self.last => continue,
                Ok(connection) => {
                    self.last = Some(connection.id());
                    return Ok(connection);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "connected events lagged");
                }
                Err(RecvError::Closed) => return Err(Error::ChannelClosed),
            }
        }
    }
}
