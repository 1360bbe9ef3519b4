use crate::model::ListingRecord;
use reqwest::header::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// 请求所属阶段，决定由谁消费响应。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Bootstrap,
    Listing { page: u32 },
    Detail(ListingRecord),
}

impl Stage {
    pub fn label(&self) -> String {
        match self {
            Stage::Bootstrap => "bootstrap".to_string(),
            Stage::Listing { page } => format!("listing#{}", page),
            Stage::Detail(record) => format!("detail#{} {}", record.page, record.name),
        }
    }
}

/// 一次待执行的抓取请求，由状态机创建，交给 dispatcher 执行后销毁。
#[derive(Debug, Clone)]
pub struct RequestTask {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
    pub stage: Stage,
}

impl RequestTask {
    pub fn get(url: impl Into<String>, stage: Stage) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: Vec::new(),
            form: None,
            stage,
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>, stage: Stage) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            headers: Vec::new(),
            form: Some(form),
            stage,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}
