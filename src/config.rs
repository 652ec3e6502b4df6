//! 定义了连接管理器和传输握手的可配置参数。
//! Defines configurable parameters for the connection manager and the transport handshake.

use crate::error::{Error, Result};
use std::time::Duration;

/// A structure containing all configurable parameters for a `ClientManager`.
///
/// 包含 `ClientManager` 所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct Config {
    /// How often the current connection is replaced, regardless of its health.
    /// This bounds the lifetime of a single session and keeps the reconnection
    /// path exercised.
    ///
    /// 无论当前连接是否健康，替换它的频率。
    /// 这限定了单个会话的生命周期，并持续演练重连路径。
    pub recycle_interval: Duration,

    /// How long a retired connection stays open so that in-flight work
    /// (acks, pending publishes) can complete.
    ///
    /// 被退役的连接保持打开的时长，以便正在进行的工作（确认、待发布消息）能够完成。
    pub retirement_delay: Duration,

    /// The minimum time between two connection attempts, measured from the
    /// start of the previous attempt.
    ///
    /// 两次连接尝试之间的最短时间，从上一次尝试开始时计算。
    pub min_reconnection_interval: Duration,

    /// Parameters handed to the transport on every handshake.
    /// 每次握手时传递给传输层的参数。
    pub connect: ConnectOptions,
}

/// Protocol keep-alive and timeout parameters passed to `Transport::connect`.
///
/// 传递给 `Transport::connect` 的协议保活与超时参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// The heartbeat interval negotiated with the server.
    /// 与服务器协商的心跳间隔。
    pub heartbeat: Duration,
    /// Disable Nagle's algorithm on the underlying socket.
    /// 在底层套接字上禁用Nagle算法。
    pub no_delay: bool,
    /// The maximum time the handshake may take.
    /// 握手允许的最长时间。
    pub timeout: Duration,
}

impl Config {
    /// Checks the semantic constraints that the type system cannot express.
    ///
    /// 检查类型系统无法表达的语义约束。
    pub fn validate(&self) -> Result<()> {
        if self.recycle_interval.is_zero() {
            return Err(Error::InvalidConfiguration(
                "recycle_interval must be greater than zero".to_string(),
            ));
        }
        if self.connect.timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "connect.timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recycle_interval: Duration::from_secs(3600),
            retirement_delay: Duration::from_secs(30),
            min_reconnection_interval: Duration::from_secs(15),
            connect: ConnectOptions::default(),
        }
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(120),
            no_delay: true,
            timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.recycle_interval, Duration::from_secs(3600));
        assert_eq!(config.retirement_delay, Duration::from_secs(30));
        assert_eq!(config.min_reconnection_interval, Duration::from_secs(15));
        assert_eq!(config.connect.heartbeat, Duration::from_secs(120));
        assert!(config.connect.no_delay);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_recycle_interval_is_rejected() {
        let config = Config {
            recycle_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn zero_retirement_delay_is_allowed() {
        let config = Config {
            retirement_delay: Duration::ZERO,
            min_reconnection_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }
}
