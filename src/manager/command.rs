//! Commands and internal events processed by the manager actor.
//!
//! 由管理器actor处理的命令与内部事件。

use crate::{
    connection::{ConnectionId, ConnectionState},
    credentials::ResolvedCredentials,
    error::{Error, Result},
};
use tokio::sync::oneshot;

/// Commands sent to the `ManagerActor` by the public handles.
///
/// 由公共句柄发送给 `ManagerActor` 的命令。
#[derive(Debug)]
pub(crate) enum ManagerCommand {
    /// Start connecting and schedule periodic recycling.
    /// 开始连接并安排周期性回收。
    Start {
        response_tx: oneshot::Sender<Result<()>>,
    },
    /// Retire everything without replacement; answer once the pool drained.
    /// 退役所有连接且不替换；在连接池排空后应答。
    Stop {
        response_tx: oneshot::Sender<Result<()>>,
    },
    /// Retire the head connection and start a replacement.
    /// 退役头部连接并启动替代连接。
    Recycle,
    /// A connection, or something using it, reported a failure.
    /// 某个连接（或使用它的某方）报告了失败。
    ConnectionFailed { id: ConnectionId },
    /// Retire one connection without replacing it.
    /// 退役单个连接而不替换它。
    Retire { id: ConnectionId },
    /// Snapshot of the pool, head first.
    /// 连接池快照，头部在前。
    PoolStates {
        response_tx: oneshot::Sender<Vec<(ConnectionId, ConnectionState)>>,
    },
}

/// Events reported back to the actor by the tasks it spawned.
///
/// 由actor派生的任务回报给actor的事件。
pub(crate) enum ManagerEvent<H> {
    /// A handshake finished, successfully or not.
    /// 一次握手结束，无论成功与否。
    Handshake {
        id: ConnectionId,
        /// Credentials fetched during this attempt, to be cached.
        fetched: Option<ResolvedCredentials>,
        result: Result<H>,
    },
    /// The transport session of a connection errored or closed.
    /// 某个连接的传输会话出错或关闭。
    SessionLost { id: ConnectionId, error: Error },
}
