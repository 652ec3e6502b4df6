//! Transport layer abstraction for the wire-protocol library.
//!
//! The manager never interprets protocol frames. It only needs to open a
//! session, open channels on it, close both, and learn when either dies.
//! Implement these traits on top of an AMQP client library.
//!
//! 线协议库的传输层抽象。
//!
//! 管理器从不解释协议帧。它只需要打开会话、在会话上打开通道、关闭二者，
//! 并在任一方失效时得到通知。请基于AMQP客户端库实现这些trait。

use crate::{
    config::ConnectOptions,
    error::{Error, Result},
};
use async_trait::async_trait;

/// The channel type produced by a transport's handles.
pub type ChannelOf<T> = <<T as Transport>::Handle as TransportHandle>::Channel;

/// Establishes transport sessions.
///
/// 建立传输会话。
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The live session object returned by a successful handshake.
    /// 成功握手后返回的活动会话对象。
    type Handle: TransportHandle;

    /// Performs the handshake with the server at `uri`.
    ///
    /// No retry is expected here; the manager decides what to do on failure.
    ///
    /// 与 `uri` 处的服务器执行握手。
    ///
    /// 此处不应重试；失败后的处理由管理器决定。
    async fn connect(&self, uri: &str, options: &ConnectOptions) -> Result<Self::Handle>;
}

/// A live transport session.
///
/// 活动的传输会话。
#[async_trait]
pub trait TransportHandle: Send + Sync + 'static {
    /// The channel type multiplexed over this session.
    /// 在此会话上复用的通道类型。
    type Channel: TransportChannel;

    /// Opens a regular channel.
    /// 打开一个普通通道。
    async fn create_channel(&self) -> Result<Self::Channel>;

    /// Opens a channel in publisher-confirm mode.
    /// 打开一个处于发布确认模式的通道。
    async fn create_confirm_channel(&self) -> Result<Self::Channel>;

    /// Closes the session. Best effort: a dead session may fail to close.
    /// 关闭会话。尽力而为：已失效的会话可能无法正常关闭。
    async fn close(&self) -> Result<()>;

    /// Resolves once the session reports an error or closes, for any reason.
    ///
    /// 一旦会话报告错误或因任何原因关闭即完成。
    async fn closed(&self) -> Error;
}

/// A channel multiplexed over a transport session.
///
/// 在传输会话上复用的通道。
#[async_trait]
pub trait TransportChannel: Send + Sync + 'static {
    /// Closes the channel.
    /// 关闭通道。
    async fn close(&self) -> Result<()>;

    /// Resolves once the channel reports an error.
    /// 一旦通道报告错误即完成。
    async fn failed(&self) -> Error;
}

/// The kind of channel requested from the transport.
///
/// 向传输层请求的通道类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelKind {
    /// A plain channel.
    /// 普通通道。
    #[default]
    Regular,
    /// A channel with publisher confirms enabled.
    /// 启用发布确认的通道。
    Confirm,
}
