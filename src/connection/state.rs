//! 连接状态及其合法转换
//! Connection states and their legal transitions
//!
//! ```text
//! Waiting → Connecting → Connected → Retiring → Finished
//!              │                        ↑
//!              └── handshake failure ───┘
//! ```
//!
//! `Retiring` 可以从任何非终止状态进入。
//! `Retiring` is reachable from every non-terminal state.

use std::fmt;

/// The lifecycle state of a single connection.
///
/// The variants are ordered: a connection only ever moves forward.
///
/// 单个连接的生命周期状态。
///
/// 变体是有序的：连接只会向前推进。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    /// Waiting for the throttled connect attempt to start.
    /// 等待节流后的连接尝试开始。
    Waiting,
    /// The handshake is in flight.
    /// 握手正在进行中。
    Connecting,
    /// The session is up and serving new work.
    /// 会话已建立，正在承接新工作。
    Connected,
    /// Draining in-flight work; no new work should be started.
    /// 正在排空进行中的工作；不应再开始新工作。
    Retiring,
    /// The session is closed.
    /// 会话已关闭。
    Finished,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is allowed.
    ///
    /// 从 `self` 转换到 `next` 是否合法。
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Waiting, Connecting)
                | (Connecting, Connected)
                | (Waiting | Connecting | Connected, Retiring)
                | (Retiring, Finished)
        )
    }

    /// `Retiring` or `Finished`: failures no longer matter.
    ///
    /// 处于 `Retiring` 或 `Finished`：失败已无关紧要。
    pub fn is_retired(self) -> bool {
        self >= ConnectionState::Retiring
    }

    /// The state name used in logs.
    /// 日志中使用的状态名称。
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Waiting => "waiting",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Retiring => "retiring",
            ConnectionState::Finished => "finished",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle notifications emitted by a connection.
///
/// 连接发出的生命周期通知。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The handshake completed and the handle is installed.
    /// 握手完成，句柄已安装。
    Connected,
    /// The connection is about to drain. Stop consuming; a new connection
    /// will take over shortly.
    ///
    /// 连接即将排空。停止消费；新连接很快会接管。
    Retiring,
    /// The transport handle has been closed.
    /// 传输句柄已关闭。
    Finished,
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    const ALL: [ConnectionState; 5] = [Waiting, Connecting, Connected, Retiring, Finished];

    #[test]
    fn only_forward_transitions_are_valid() {
        for from in ALL {
            for to in ALL {
                if to <= from {
                    assert!(!from.can_transition_to(to), "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn retiring_reachable_from_every_live_state() {
        assert!(Waiting.can_transition_to(Retiring));
        assert!(Connecting.can_transition_to(Retiring));
        assert!(Connected.can_transition_to(Retiring));
        assert!(!Finished.can_transition_to(Retiring));
    }

    #[test]
    fn no_shortcuts() {
        assert!(!Waiting.can_transition_to(Connected));
        assert!(!Waiting.can_transition_to(Finished));
        assert!(!Connecting.can_transition_to(Finished));
        assert!(!Connected.can_transition_to(Finished));
    }

    #[test]
    fn retired_states() {
        assert!(!Connected.is_retired());
        assert!(Retiring.is_retired());
        assert!(Finished.is_retired());
        assert_eq!(Retiring.to_string(), "retiring");
    }
}
