mod app_config;
mod faculty;
mod proxy;
mod request;

pub use app_config::{AppConfig, CrawlConfig, DbConfig, LoggingConfig, ProxyAuthMode, ProxyConfig};
pub use faculty::{ExtractedRecord, ListingPage, ListingRecord};
pub use proxy::{ProxyApiResponse, ProxyCredential, ProxyEntry};
pub use request::{FetchedResponse, Method, RequestTask, Stage};
