//! Telemetry sink for connection lifecycle counters and measurements.
//!
//! 连接生命周期计数器与度量的遥测接收端。

use std::fmt::Debug;

/// Counter incremented every time the manager recycles.
pub const RECYCLE: &str = "connection.recycle";
/// Counter incremented when a handshake is started.
pub const ATTEMPT: &str = "connection.attempt";
/// Counter incremented when a connection fails (handshake or afterwards).
pub const FAILED: &str = "connection.failed";
/// Counter incremented when a handshake completes and the handle is installed.
pub const CONNECTED: &str = "connection.connected";
/// Counter incremented when a connection starts retiring.
pub const RETIRED: &str = "connection.retired";
/// Counter incremented when a connection finishes.
pub const FINISHED: &str = "connection.finished";
/// Measurement of the handshake duration, in milliseconds.
pub const HANDSHAKE_MS: &str = "connection.handshake_ms";

/// A sink for operational telemetry.
///
/// Implementations must be cheap and non-blocking: they are called from the
/// manager's event loop.
///
/// 运维遥测的接收端。
///
/// 实现必须廉价且非阻塞：它们会在管理器的事件循环中被调用。
pub trait Monitor: Send + Sync + Debug + 'static {
    /// Adds `value` to the counter named `key`.
    /// 将 `value` 加到名为 `key` 的计数器上。
    fn count(&self, key: &str, value: u64);

    /// Records a single measurement for `key`.
    /// 为 `key` 记录一次度量值。
    fn measure(&self, key: &str, value: f64);
}

/// A monitor that forwards everything to `tracing` at debug level.
///
/// 将所有内容以 debug 级别转发到 `tracing` 的监视器。
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl Monitor for TracingMonitor {
    fn count(&self, key: &str, value: u64) {
        tracing::debug!(metric = key, value, "count");
    }

    fn measure(&self, key: &str, value: f64) {
        tracing::debug!(metric = key, value, "measure");
    }
}
