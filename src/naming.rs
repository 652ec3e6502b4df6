//! Namespaced object names.
//!
//! Exchanges and queues a client owns are named `<kind>/<namespace>/<name>`,
//! where the namespace comes from the credentials in use.
//!
//! 带命名空间的对象名称。客户端拥有的交换器和队列命名为
//! `<kind>/<namespace>/<name>`，其中命名空间来自当前使用的凭据。

use crate::error::{Error, Result};

/// Builds `<kind>/<namespace>/<name>`.
///
/// Fails if `kind` or `name` is empty, or if no namespace is known.
///
/// 构建 `<kind>/<namespace>/<name>`。当 `kind` 或 `name` 为空，
/// 或命名空间未知时失败。
pub fn full_object_name(kind: &str, namespace: Option<&str>, name: &str) -> Result<String> {
    if kind.is_empty() {
        return Err(Error::MissingArgument("kind"));
    }
    if name.is_empty() {
        return Err(Error::MissingArgument("name"));
    }
    match namespace {
        Some(namespace) if !namespace.is_empty() => Ok(format!("{kind}/{namespace}/{name}")),
        _ => Err(Error::NamespaceUnavailable),
    }
}
