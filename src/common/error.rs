use thiserror::Error;

/// dispatcher 执行单个请求时的失败分类。
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("非法 URL：{0}")]
    InvalidUrl(String),
    #[error("请求超时")]
    Timeout,
    #[error("连接失败：{0}")]
    Connect(String),
    #[error("响应状态码异常：{0}")]
    Status(u16),
    #[error("读取响应体失败：{0}")]
    Body(String),
    #[error("构建 HTTP 客户端失败：{0}")]
    Client(String),
}

impl FetchError {
    /// 超时、连接失败、5xx 与 429 视为瞬时错误，可换代理重试。
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Connect(_) | FetchError::Body(_) => true,
            FetchError::Status(code) => *code == 429 || *code >= 500,
            FetchError::InvalidUrl(_) | FetchError::Client(_) => false,
        }
    }

    /// 日志里使用的错误类别名。
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl(_) => "invalid_url",
            FetchError::Timeout => "timeout",
            FetchError::Connect(_) => "connect",
            FetchError::Status(_) => "status",
            FetchError::Body(_) => "body",
            FetchError::Client(_) => "client",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else if e.is_builder() {
            FetchError::InvalidUrl(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else if e.is_body() || e.is_decode() {
            FetchError::Body(e.to_string())
        } else {
            FetchError::Connect(e.to_string())
        }
    }
}

/// 代理池刷新失败的原因，均不致命。
#[derive(Error, Debug)]
pub enum ProxyRefreshError {
    #[error("请求代理 API 失败：{0}")]
    Network(String),
    #[error("代理 API 拒绝请求：code={code}, msg={msg}")]
    Rejected { code: i64, msg: String },
    #[error("代理 API 响应无法解析：{0}")]
    Malformed(String),
    #[error("代理 API 返回空列表")]
    Empty,
}

/// 爬取流程中的错误。只有 `SessionBootstrap` 会终止整个运行。
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("会话初始化失败：{0}")]
    SessionBootstrap(#[source] FetchError),
    #[error("第 {page} 页列表请求失败：{source}")]
    ListingFetch { page: u32, source: FetchError },
    #[error("第 {page} 页列表 JSON 解析失败：{source}")]
    ListingParse {
        page: u32,
        source: serde_json::Error,
    },
    #[error("详情页 {url} 请求失败：{source}")]
    DetailFetch { url: String, source: FetchError },
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
    #[error("配置错误：{0}")]
    Config(String),
    #[error("选择器无效：{0}")]
    Selector(String),
}
