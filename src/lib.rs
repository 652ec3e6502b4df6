#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The root of the resilient AMQP connection manager.
//! 弹性AMQP连接管理器的根。
//!
//! [`ClientManager`] keeps a single live connection to the broker, rotates it
//! periodically and on failure, and lets retired connections drain before
//! closing them. Dependent subsystems subscribe to connected events and redo
//! their per-connection setup (consumers, bindings, queues) on each one.
//!
//! [`ClientManager`] 保持与代理的单个活动连接，周期性地以及在失败时轮换它，
//! 并让退役的连接在关闭前排空。依赖的子系统订阅连接建立事件，
//! 并在每次事件时重新进行各连接的初始化（消费者、绑定、队列）。

pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod naming;
pub mod transport;

mod channel;
mod timer;

#[cfg(test)]
mod testing;

pub use config::{Config, ConnectOptions};
pub use connection::{Connection, ConnectionEvent, ConnectionId, ConnectionState};
pub use credentials::{CredentialProvider, Credentials, StaticCredentials, build_connection_string};
pub use error::{Error, Result};
pub use manager::{ClientManager, ClientManagerBuilder, ConnectedEvents};
pub use monitor::{Monitor, TracingMonitor};
pub use transport::{ChannelKind, ChannelOf, Transport, TransportChannel, TransportHandle};
