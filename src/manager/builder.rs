//! Assembles and spawns a [`ClientManager`].
//!
//! 组装并启动 [`ClientManager`]。

use super::{
    ClientManager,
    actor::{ManagerActor, Publishers},
};
use crate::{
    config::Config,
    credentials::{CredentialProvider, StaticCredentials},
    error::{Error, Result},
    monitor::Monitor,
    transport::Transport,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;

const COMMAND_CAPACITY: usize = 128;
const CONNECTED_CAPACITY: usize = 16;

/// Builder for [`ClientManager`].
///
/// Exactly one of [`credentials`](Self::credentials) or
/// [`connection_string`](Self::connection_string) must be given, and a
/// [`monitor`](Self::monitor) is required.
///
/// [`ClientManager`] 的构建器。
///
/// 必须且只能提供 [`credentials`](Self::credentials) 或
/// [`connection_string`](Self::connection_string) 之一，并且必须提供
/// [`monitor`](Self::monitor)。
#[derive(Default)]
pub struct ClientManagerBuilder {
    config: Config,
    provider: Option<Arc<dyn CredentialProvider>>,
    connection_string: Option<String>,
    monitor: Option<Arc<dyn Monitor>>,
}

impl ClientManagerBuilder {
    /// Starts from [`Config::default`] with no credentials and no monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// How often the live connection is replaced. Must be non-zero.
    /// Credentials carrying a rotation interval override it.
    /// 活动连接的替换周期，必须非零。凭据携带的轮换间隔会覆盖它。
    pub fn recycle_interval(mut self, interval: Duration) -> Self {
        self.config.recycle_interval = interval;
        self
    }

    /// How long a retired connection stays open for in-flight work before
    /// its session is closed.
    /// 退役连接在关闭会话前为进行中的操作保持打开的时长。
    pub fn retirement_delay(mut self, delay: Duration) -> Self {
        self.config.retirement_delay = delay;
        self
    }

    /// Minimum time between the starts of two connection attempts.
    /// 两次连接尝试开始之间的最短间隔。
    pub fn min_reconnection_interval(mut self, interval: Duration) -> Self {
        self.config.min_reconnection_interval = interval;
        self
    }

    /// Supplies credentials from `provider` on demand.
    /// 按需从 `provider` 获取凭据。
    pub fn credentials(mut self, provider: impl CredentialProvider) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Uses a fixed connection string.
    /// 使用固定的连接字符串。
    pub fn connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    /// The sink for lifecycle counters and measurements.
    /// 生命周期计数器与度量的接收端。
    pub fn monitor(mut self, monitor: impl Monitor) -> Self {
        self.monitor = Some(Arc::new(monitor));
        self
    }

    /// Validates the configuration and spawns the manager on the current Tokio
    /// runtime. The manager is idle until [`ClientManager::start`] is called.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// 校验配置并在当前 Tokio 运行时上启动管理器。
    /// 在调用 [`ClientManager::start`] 之前，管理器处于空闲状态。
    pub fn build<T: Transport>(self, transport: T) -> Result<ClientManager<T>> {
        let provider: Arc<dyn CredentialProvider> =
            match (self.provider, self.connection_string) {
                (Some(_), Some(_)) => {
                    return Err(Error::InvalidConfiguration(
                        "credentials cannot be given along with connection_string".to_string(),
                    ));
                }
                (Some(provider), None) => provider,
                (None, Some(connection_string)) => {
                    Arc::new(StaticCredentials::from_connection_string(connection_string))
                }
                (None, None) => return Err(Error::MissingConfiguration("credentials")),
            };
        let monitor = self.monitor.ok_or(Error::MissingConfiguration("monitor"))?;
        self.config.validate()?;
        debug!(config = ?self.config, "building client manager");

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (connected_tx, _) = broadcast::channel(CONNECTED_CAPACITY);
        let (active_tx, active_rx) = watch::channel(None);
        let (namespace_tx, namespace_rx) = watch::channel(None);

        let actor = ManagerActor::new(
            Arc::new(transport),
            provider,
            monitor,
            self.config,
            command_rx,
            command_tx.downgrade(),
            Publishers {
                connected_tx: connected_tx.clone(),
                active_tx,
                namespace_tx,
            },
        );
        tokio::spawn(actor.run());

        Ok(ClientManager {
            command_tx,
            active_rx,
            namespace_rx,
            connected_tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_setters_reach_the_config() {
        let builder = ClientManagerBuilder::new()
            .recycle_interval(Duration::from_secs(60))
            .retirement_delay(Duration::from_secs(5))
            .min_reconnection_interval(Duration::from_secs(2));

        assert_eq!(builder.config.recycle_interval, Duration::from_secs(60));
        assert_eq!(builder.config.retirement_delay, Duration::from_secs(5));
        assert_eq!(builder.config.min_reconnection_interval, Duration::from_secs(2));
        assert_eq!(builder.config.connect, Config::default().connect);
    }
}
