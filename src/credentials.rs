//! Credential acquisition and connection-string handling.
//!
//! The manager never knows how credentials are obtained: it asks a
//! [`CredentialProvider`] once, caches the answer, and only asks again when a
//! server-suggested rotation interval expires.
//!
//! 凭据获取与连接字符串处理。
//!
//! 管理器不关心凭据如何获得：它向 [`CredentialProvider`] 请求一次并缓存结果，
//! 仅当服务器建议的轮换间隔到期时才会再次请求。

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::{future::Future, time::Duration};
use url::Url;

/// The port used for TLS-wrapped AMQP connections.
const AMQPS_PORT: u16 = 5671;

/// Connection parameters returned by a [`CredentialProvider`].
///
/// 由 [`CredentialProvider`] 返回的连接参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The full connection URI, including username and password.
    /// 完整的连接URI，包含用户名和密码。
    pub connection_string: String,
    /// How long these credentials should be used before the connection is
    /// rotated, as suggested by the server that issued them.
    ///
    /// 签发凭据的服务器建议的使用时长，过后应轮换连接。
    pub rotation_interval: Option<Duration>,
}

impl Credentials {
    /// Credentials without a rotation hint.
    /// 不带轮换提示的凭据。
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            rotation_interval: None,
        }
    }

    /// Attaches a server-suggested rotation interval.
    /// 附加服务器建议的轮换间隔。
    pub fn with_rotation_interval(mut self, interval: Duration) -> Self {
        self.rotation_interval = Some(interval);
        self
    }
}

/// An asynchronous source of connection credentials.
///
/// Any failure is treated as a failed connection attempt by the manager.
///
/// 异步的连接凭据来源。
///
/// 任何失败都会被管理器视为一次失败的连接尝试。
#[async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
    /// Fetches the current credentials.
    /// 获取当前凭据。
    async fn credentials(&self) -> Result<Credentials>;
}

#[async_trait]
impl<F, Fut> CredentialProvider for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Credentials>> + Send + 'static,
{
    async fn credentials(&self) -> Result<Credentials> {
        (self)().await
    }
}

/// A provider that always returns the same credentials.
///
/// 始终返回相同凭据的提供者。
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    /// Uses a ready-made connection string.
    /// 使用现成的连接字符串。
    pub fn from_connection_string(connection_string: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(connection_string),
        }
    }

    /// Builds an `amqps://` connection string from its parts.
    /// 由各部分构建 `amqps://` 连接字符串。
    pub fn from_user(username: &str, password: &str, hostname: &str) -> Result<Self> {
        Ok(Self::from_connection_string(build_connection_string(
            username, password, hostname,
        )?))
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}

/// Builds `amqps://<username>:<password>@<hostname>:5671`.
///
/// Username and password are percent-encoded with the URL userinfo rules, so
/// the namespace derived from the result decodes back to `username`.
///
/// 构建 `amqps://<username>:<password>@<hostname>:5671`。
///
/// 用户名和密码按照URL userinfo规则进行百分号编码，
/// 因此从结果推导出的命名空间可以解码回 `username`。
pub fn build_connection_string(username: &str, password: &str, hostname: &str) -> Result<String> {
    if username.is_empty() {
        return Err(Error::MissingArgument("username"));
    }
    if password.is_empty() {
        return Err(Error::MissingArgument("password"));
    }
    if hostname.is_empty() {
        return Err(Error::MissingArgument("hostname"));
    }

    let mut url = Url::parse(&format!("amqps://{hostname}:{AMQPS_PORT}"))?;
    url.set_username(username)
        .and_then(|_| url.set_password(Some(password)))
        .map_err(|_| {
            Error::InvalidConfiguration(format!("hostname {hostname:?} cannot carry credentials"))
        })?;
    Ok(url.to_string())
}

/// Credentials as cached by the manager, with the namespace already derived.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedCredentials {
    pub(crate) connection_string: String,
    pub(crate) namespace: String,
    pub(crate) rotation_interval: Option<Duration>,
}

impl ResolvedCredentials {
    pub(crate) fn resolve(credentials: Credentials) -> Result<Self> {
        let namespace = namespace_of(&credentials.connection_string)?;
        Ok(Self {
            connection_string: credentials.connection_string,
            namespace,
            rotation_interval: credentials.rotation_interval,
        })
    }
}

/// Fetches and resolves credentials in one step.
pub(crate) async fn fetch(provider: &dyn CredentialProvider) -> Result<ResolvedCredentials> {
    ResolvedCredentials::resolve(provider.credentials().await?)
}

/// The namespace is the percent-decoded username of the connection URI.
///
/// 命名空间是连接URI中经过百分号解码的用户名。
pub(crate) fn namespace_of(connection_string: &str) -> Result<String> {
    let url = Url::parse(connection_string)?;
    Ok(urlencoding::decode(url.username())?.into_owned())
}
