pub mod kdl;

use crate::common::error::ProxyRefreshError;
use async_trait::async_trait;

pub use kdl::KdlProxySource;

/// 外部代理分配来源。
///
/// 每次调用返回一批 `host:port` 字符串；失败时返回 [`ProxyRefreshError`]，
/// 由代理池决定是否保留旧列表。
#[async_trait]
pub trait ProxySource: Send + Sync {
    async fn allocate(&self) -> Result<Vec<String>, ProxyRefreshError>;
}
