//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// A boxed error produced by a transport or credential implementation.
/// 由传输层或凭据实现产生的装箱错误。
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The primary error type for the connection manager.
/// 连接管理器的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// A required builder option was not supplied.
    /// 未提供必需的构建器选项。
    #[error("{0} is required")]
    MissingConfiguration(&'static str),

    /// The supplied configuration is inconsistent or out of range.
    /// 提供的配置不一致或超出范围。
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A required argument was empty.
    /// 必需的参数为空。
    #[error("{0} is required")]
    MissingArgument(&'static str),

    /// `stop()` was called on a manager that is not running.
    /// 在未运行的管理器上调用了 `stop()`。
    #[error("Not running")]
    NotRunning,

    /// `start()` was called on a manager that is already running.
    /// 在已运行的管理器上调用了 `start()`。
    #[error("Already running")]
    AlreadyRunning,

    /// `start()` was called while a previous `stop()` is still draining.
    /// 在之前的 `stop()` 仍在排空时调用了 `start()`。
    #[error("Manager is still shutting down")]
    ShuttingDown,

    /// The connection string could not be parsed as a URL.
    /// 连接字符串无法解析为URL。
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(#[from] url::ParseError),

    /// The username of the connection string is not valid percent-encoded UTF-8.
    /// 连接字符串的用户名不是有效的百分号编码UTF-8。
    #[error("invalid namespace encoding: {0}")]
    InvalidNamespace(#[from] std::string::FromUtf8Error),

    /// The namespace is not known until the first credentials have been fetched.
    /// 在首次获取凭据之前，命名空间是未知的。
    #[error("namespace is not known yet")]
    NamespaceUnavailable,

    /// The credential provider failed.
    /// 凭据提供者失败。
    #[error("credential error: {0}")]
    Credentials(#[source] BoxError),

    /// The transport library reported a failure.
    /// 传输库报告了失败。
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The connection has no live transport handle.
    /// 连接没有活动的传输句柄。
    #[error("Connection not established")]
    NotConnected,

    /// An internal channel for communication between tasks was closed unexpectedly.
    /// 用于任务间通信的内部通道意外关闭。
    #[error("Internal channel is broken")]
    ChannelClosed,
}

impl Error {
    /// Wraps any error-like value as a transport failure.
    /// 将任意错误值包装为传输失败。
    pub fn transport<E: Into<BoxError>>(err: E) -> Self {
        Error::Transport(err.into())
    }

    /// Wraps any error-like value as a credential failure.
    /// 将任意错误值包装为凭据失败。
    pub fn credentials<E: Into<BoxError>>(err: E) -> Self {
        Error::Credentials(err.into())
    }
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;
