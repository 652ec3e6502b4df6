//! 作用域通道：在单个操作期间借出一个通道，之后总会关闭它。
//! Scoped channels: a channel is lent out for one operation and always closed
//! afterwards.
//!
//! A protocol-level channel error usually means the session itself is in a bad
//! state, so any channel failure is reported to the owning connection, which
//! lets the manager replace it.
//!
//! 协议级的通道错误通常意味着会话本身已处于异常状态，因此任何通道失败都会报告给
//! 所属连接，由管理器替换它。

use crate::{
    connection::Connection,
    error::Error,
    transport::{ChannelKind, TransportChannel, TransportHandle},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens a channel of `kind` on `connection`, runs `f` with it and closes it.
///
/// The result of `f` is returned unchanged; failures to open or close the
/// channel, and channel errors while `f` runs, mark the connection failed.
/// If the returned future is dropped early (a caller's timeout, an aborted
/// task), the channel is closed in the background instead.
///
/// 在 `connection` 上打开 `kind` 类型的通道，用它运行 `f`，然后关闭它。
/// 若返回的 future 被提前丢弃，通道会在后台关闭。
pub(crate) async fn with_scoped_channel<H, F, R, E>(
    connection: &Connection<H>,
    kind: ChannelKind,
    f: F,
) -> Result<R, E>
where
    H: TransportHandle,
    F: AsyncFnOnce(&H::Channel) -> Result<R, E>,
    E: From<Error>,
{
    let Some(handle) = connection.transport() else {
        return Err(Error::NotConnected.into());
    };
    let opened = match kind {
        ChannelKind::Regular => handle.create_channel().await,
        ChannelKind::Confirm => handle.create_confirm_channel().await,
    };
    let channel = match opened {
        Ok(channel) => channel,
        Err(error) => {
            warn!(conn_id = %connection.id(), ?kind, %error, "failed to open channel");
            connection.failed().await;
            return Err(error.into());
        }
    };

    let channel = Arc::new(channel);
    let mut guard = CloseOnDrop {
        connection: connection.clone(),
        channel: Some(Arc::clone(&channel)),
    };
    let result = run_watched(connection, &*channel, f).await;
    guard.channel = None;

    if let Err(error) = channel.close().await {
        debug!(conn_id = %connection.id(), %error, "failed to close channel");
        connection.failed().await;
    }
    result
}

/// Runs `f` while watching the channel for errors.
async fn run_watched<H, F, R, E>(connection: &Connection<H>, channel: &H::Channel, f: F) -> Result<R, E>
where
    H: TransportHandle,
    F: AsyncFnOnce(&H::Channel) -> Result<R, E>,
{
    let work = f(channel);
    tokio::pin!(work);
    let failure = channel.failed();
    tokio::pin!(failure);
    let mut watching = true;

    loop {
        tokio::select! {
            biased;
            result = &mut work => return result,
            error = &mut failure, if watching => {
                watching = false;
                warn!(conn_id = %connection.id(), %error, "channel error");
                connection.failed().await;
            }
        }
    }
}

/// Closes a lent-out channel whose operation was cancelled before it could.
///
/// 在操作被取消、尚未关闭通道时，负责关闭借出的通道。
struct CloseOnDrop<H: TransportHandle> {
    connection: Connection<H>,
    /// `None` once the normal close path has taken over.
    channel: Option<Arc<H::Channel>>,
}

impl<H: TransportHandle> Drop for CloseOnDrop<H> {
    fn drop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(conn_id = %self.connection.id(), "no runtime left to close cancelled channel");
            return;
        };
        let connection = self.connection.clone();
        debug!(conn_id = %connection.id(), "operation cancelled, closing its channel");
        runtime.spawn(async move {
            if let Err(error) = channel.close().await {
                debug!(conn_id = %connection.id(), %error, "failed to close channel");
                connection.failed().await;
            }
        });
    }
}
