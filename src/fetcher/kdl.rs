use crate::common::error::ProxyRefreshError;
use crate::common::utils::is_proxy_addr;
use crate::fetcher::ProxySource;
use crate::model::ProxyApiResponse;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// 快代理（KDL）私密代理分配接口。
///
/// 接口返回形如：
/// ```json
/// { "code": 0, "msg": "", "data": { "proxy_list": ["113.124.86.24:16818", "..."] } }
/// ```
/// `code != 0` 时 `msg` 给出原因。
pub struct KdlProxySource {
    api_url: String,
    timeout: Duration,
}

impl KdlProxySource {
    pub fn new(api_url: &str, timeout: Duration) -> Self {
        Self {
            api_url: api_url.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl ProxySource for KdlProxySource {
    async fn allocate(&self) -> Result<Vec<String>, ProxyRefreshError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProxyRefreshError::Network(e.to_string()))?;

        let resp = client
            .get(&self.api_url)
            .send()
            .await
            .map_err(|e| ProxyRefreshError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProxyRefreshError::Network(format!("HTTP {}", status.as_u16())));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| ProxyRefreshError::Network(e.to_string()))?;
        let data: ProxyApiResponse =
            serde_json::from_str(&text).map_err(|e| ProxyRefreshError::Malformed(e.to_string()))?;

        if data.code != 0 {
            return Err(ProxyRefreshError::Rejected {
                code: data.code,
                msg: data.msg,
            });
        }

        let raw = data.data.unwrap_or_default().proxy_list;
        let total = raw.len();
        let list: Vec<String> = raw
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| is_proxy_addr(s))
            .collect();

        if list.len() < total {
            warn!("KDL 返回 {} 条代理，其中 {} 条格式不合法已丢弃", total, total - list.len());
        }
        if list.is_empty() {
            return Err(ProxyRefreshError::Empty);
        }

        info!("KDL 成功获取 {} 个代理IP", list.len());
        Ok(list)
    }
}
