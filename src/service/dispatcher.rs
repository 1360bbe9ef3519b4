//! 请求分发：为每个 [`RequestTask`] 附加随机代理与 User-Agent 后执行。
//!
//! 所有对目标站点的网络请求都经过这里。失败只做分类、记录并上报代理池，
//! 不在此处重试，由调用方决定跳过、重试还是终止。

use crate::common::error::FetchError;
use crate::model::{FetchedResponse, Method, RequestTask};
use crate::service::identity::IdentityRotator;
use crate::model::ProxyEntry;
use crate::service::proxy_pool::{ProxyPool, ProxySet};
use async_trait::async_trait;
use rand::Rng;
use reqwest::cookie::Jar;
use reqwest::header::USER_AGENT;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn execute(&self, task: RequestTask) -> Result<FetchedResponse, FetchError>;
}

/// 按代理地址缓存的客户端（`None` 为直连），代理集合快照一换就整体作废。
#[derive(Default)]
struct ClientCache {
    snapshot: Option<ProxySet>,
    clients: HashMap<Option<String>, reqwest::Client>,
}

pub struct RequestDispatcher {
    pool: Arc<ProxyPool>,
    identity: IdentityRotator,
    /// 所有代理共用的 cookie，保证初始化阶段拿到的会话在后续请求中生效
    jar: Arc<Jar>,
    clients: Mutex<ClientCache>,
    timeout: Duration,
    download_delay: Duration,
}

impl RequestDispatcher {
    pub fn new(pool: Arc<ProxyPool>, timeout: Duration) -> Self {
        Self {
            pool,
            identity: IdentityRotator,
            jar: Arc::new(Jar::default()),
            clients: Mutex::new(ClientCache::default()),
            timeout,
            download_delay: Duration::ZERO,
        }
    }

    /// 每次请求前随机等待 0.5 ~ 1.5 倍的 `delay`。
    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    async fn wait_download_delay(&self) {
        if self.download_delay.is_zero() {
            return;
        }
        let factor = rand::rng().random_range(0.5..1.5);
        tokio::time::sleep(self.download_delay.mul_f64(factor)).await;
    }

    fn build_client(&self, proxy_url: Option<&str>) -> Result<reqwest::Client, FetchError> {
        let builder = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&self.jar))
            .timeout(self.timeout);

        let builder = match proxy_url {
            Some(url) => {
                let proxy = reqwest::Proxy::all(url).map_err(|e| FetchError::Client(e.to_string()))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        builder.build().map_err(|e| FetchError::Client(e.to_string()))
    }

    /// 取出 `proxy` 对应的客户端，同一快照内复用连接。
    fn client_for(&self, set: &ProxySet, proxy: Option<&ProxyEntry>) -> Result<reqwest::Client, FetchError> {
        let key = proxy.map(ProxyEntry::proxy_url);
        let mut cache = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if !cache.snapshot.as_ref().is_some_and(|s| Arc::ptr_eq(s, set)) {
            cache.snapshot = Some(Arc::clone(set));
            cache.clients.clear();
        }
        if let Some(client) = cache.clients.get(&key) {
            return Ok(client.clone());
        }
        let client = self.build_client(key.as_deref())?;
        cache.clients.insert(key, client.clone());
        Ok(client)
    }

    #[cfg(test)]
    fn cached_clients(&self) -> usize {
        self.clients.lock().unwrap().clients.len()
    }

    async fn send(
        &self,
        client: reqwest::Client,
        task: &RequestTask,
        user_agent: &str,
    ) -> Result<FetchedResponse, FetchError> {
        let mut req = match task.method {
            Method::Get => client.get(&task.url),
            Method::Post => client.post(&task.url),
        };
        for (name, value) in &task.headers {
            if !name.eq_ignore_ascii_case(USER_AGENT.as_str()) {
                req = req.header(name.as_str(), value.as_str());
            }
        }
        req = req.header(USER_AGENT, user_agent);
        if let Some(form) = &task.form {
            req = req.form(form);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let url = resp.url().to_string();
        let headers = resp.headers().clone();
        let body = resp.text().await.map_err(|e| FetchError::Body(e.to_string()))?;

        Ok(FetchedResponse {
            url,
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

#[async_trait]
impl Dispatch for RequestDispatcher {
    async fn execute(&self, task: RequestTask) -> Result<FetchedResponse, FetchError> {
        reqwest::Url::parse(&task.url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", task.url, e)))?;

        self.wait_download_delay().await;

        let set = self.pool.snapshot();
        let proxy = self.pool.select();
        let user_agent = self.identity.next();
        let label = task.stage.label();
        match &proxy {
            Some(p) => debug!("[{}] 使用代理 {}，UA: {}", label, p.addr, user_agent),
            None => debug!("[{}] 代理池为空，使用直连，UA: {}", label, user_agent),
        }

        let client = self.client_for(&set, proxy.as_ref())?;
        let result = self.send(client, &task, user_agent).await;

        if let Err(e) = &result {
            match &proxy {
                Some(p) => self.pool.report_failure(p, e),
                None => warn!("[{}] 直连请求 {} 失败 [{}]：{}", label, task.url, e.kind(), e),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ProxyRefreshError;
    use crate::fetcher::ProxySource;
    use crate::model::{ProxyAuthMode, ProxyConfig, Stage};
    use crate::service::identity::USER_AGENTS;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct DeadSource;

    #[async_trait]
    impl ProxySource for DeadSource {
        async fn allocate(&self) -> Result<Vec<String>, ProxyRefreshError> {
            Err(ProxyRefreshError::Network("unreachable".into()))
        }
    }

    fn pool(fallback: &str) -> Arc<ProxyPool> {
        Arc::new(ProxyPool::new(
            Arc::new(DeadSource),
            &ProxyConfig {
                api_url: String::new(),
                refresh_interval: 60,
                api_timeout: 1,
                auth_mode: ProxyAuthMode::AllowListed,
                username: String::new(),
                password: String::new(),
                fallback: fallback.to_string(),
            },
        ))
    }

    fn dispatcher(timeout: Duration) -> RequestDispatcher {
        RequestDispatcher::new(pool("127.0.0.1:1"), timeout)
    }

    #[tokio::test]
    async fn test_execute_applies_identity_headers_and_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .and(body_string_contains("pageIndex=1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"data":[]}"#, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let task = RequestTask::post_form(
            format!("{}/query", server.uri()),
            vec![("pageIndex".into(), "1".into()), ("rows".into(), "52".into())],
            Stage::Listing { page: 1 },
        )
        .header("X-Requested-With", "XMLHttpRequest")
        .header("User-Agent", "should-be-replaced");

        let resp = dispatcher(Duration::from_secs(2)).execute(task).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.url, format!("{}/query", server.uri()));
        assert_eq!(resp.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(resp.body, r#"{"data":[]}"#);

        let received = server.received_requests().await.unwrap();
        let ua = received[0].headers.get("user-agent").unwrap().to_str().unwrap();
        assert!(USER_AGENTS.contains(&ua));
    }

    #[tokio::test]
    async fn test_execute_classifies_status_and_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let d = dispatcher(Duration::from_millis(300));

        let busy = d.execute(RequestTask::get(format!("{}/busy", server.uri()), Stage::Bootstrap)).await;
        assert!(matches!(busy, Err(FetchError::Status(503))));
        assert!(busy.unwrap_err().is_transient());

        let gone = d.execute(RequestTask::get(format!("{}/gone", server.uri()), Stage::Bootstrap)).await;
        assert!(matches!(&gone, Err(FetchError::Status(404))));
        assert!(!gone.unwrap_err().is_transient());

        let slow = d.execute(RequestTask::get(format!("{}/slow", server.uri()), Stage::Bootstrap)).await;
        assert!(matches!(slow, Err(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_permanent() {
        let err = dispatcher(Duration::from_secs(1))
            .execute(RequestTask::get("not a url", Stage::Bootstrap))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_session_cookie_is_shared() {
        let server = MockServer::start().await;
        Mock::given(path("/list.psp"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "JSESSIONID=abc123; Path=/"),
            )
            .mount(&server)
            .await;
        Mock::given(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let d = dispatcher(Duration::from_secs(2));
        d.execute(RequestTask::get(format!("{}/list.psp", server.uri()), Stage::Bootstrap))
            .await
            .unwrap();
        d.execute(RequestTask::get(format!("{}/query", server.uri()), Stage::Listing { page: 1 }))
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        let cookie = received[1].headers.get("cookie").unwrap().to_str().unwrap();
        assert!(cookie.contains("JSESSIONID=abc123"));
        assert_eq!(d.cached_clients(), 1);
    }

    #[tokio::test]
    async fn test_clients_follow_proxy_snapshot() {
        let pool = pool("127.0.0.1:7890");
        let d = RequestDispatcher::new(Arc::clone(&pool), Duration::from_secs(1));

        let empty = pool.snapshot();
        d.client_for(&empty, None).unwrap();
        d.client_for(&empty, None).unwrap();
        assert_eq!(d.cached_clients(), 1);

        // 首次刷新失败，发布回退集合，旧快照下的客户端全部作废
        pool.refresh().await;
        let fallback = pool.snapshot();
        assert!(!Arc::ptr_eq(&empty, &fallback));
        let proxy = pool.select().unwrap();
        d.client_for(&fallback, Some(&proxy)).unwrap();
        assert_eq!(d.cached_clients(), 1);
        d.client_for(&fallback, None).unwrap();
        assert_eq!(d.cached_clients(), 2);

        // 之后的失败刷新保留原集合，缓存继续有效
        pool.refresh().await;
        let kept = pool.snapshot();
        assert!(Arc::ptr_eq(&fallback, &kept));
        d.client_for(&kept, Some(&proxy)).unwrap();
        assert_eq!(d.cached_clients(), 2);
    }

    #[tokio::test]
    async fn test_proxy_failure_is_reported() {
        let pool = pool("127.0.0.1:1");
        pool.refresh().await;
        let d = RequestDispatcher::new(Arc::clone(&pool), Duration::from_secs(2));

        let err = d
            .execute(RequestTask::get("http://example.invalid/", Stage::Bootstrap))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(pool.failure_count(), 1);
    }
}
