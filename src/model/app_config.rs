use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub proxy: ProxyConfig,
    pub crawl: CrawlConfig,
    pub db: DbConfig,
    pub log: LoggingConfig,
}

/// 代理凭证模式。
///
/// - `Authenticated`：用户名密码认证（私密代理 / 独享代理）
/// - `AllowListed`：白名单认证，代理地址中不携带凭证
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyAuthMode {
    #[default]
    Authenticated,
    AllowListed,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// 代理分配 API 地址
    pub api_url: String,
    /// 后台刷新间隔（秒）
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// 调用分配 API 的超时时间（秒）
    #[serde(default = "default_api_timeout")]
    pub api_timeout: u64,
    #[serde(default)]
    pub auth_mode: ProxyAuthMode,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// 首次刷新失败时使用的本地代理
    #[serde(default = "default_fallback")]
    pub fallback: String,
}

impl ProxyConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlConfig {
    /// 目录首页，仅用于建立会话 cookie
    pub start_url: String,
    /// 列表 AJAX 接口
    pub listing_url: String,
    /// 详情页相对地址的解析基准
    pub base_url: String,
    #[serde(default = "default_query_obj")]
    pub query_obj: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub conditions: String,
    pub orders: String,
    pub return_infos: String,
    pub school: String,
    #[serde(default)]
    pub school_level: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub download_delay_ms: u64,
    /// 详情页瞬时失败的重试次数，0 表示失败即跳过
    #[serde(default)]
    pub detail_retries: u32,
}

impl CrawlConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DbConfig {
    pub driver: String,
    pub connection_string: String,
    pub table_name: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub console_levels: Vec<String>,
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_api_timeout() -> u64 {
    10
}

fn default_fallback() -> String {
    "127.0.0.1:7890".to_string()
}

fn default_query_obj() -> String {
    "teacherHome".to_string()
}

fn default_page_size() -> u32 {
    52
}

fn default_concurrency() -> usize {
    20
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_log_file() -> String {
    "logs/crawl.log".to_string()
}

impl AppConfig {
    /// 读取配置文件（不带扩展名），并允许 `HYDRA__SECTION__KEY` 形式的环境变量覆盖。
    pub fn load(name: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(name))
            .add_source(config::Environment::with_prefix("HYDRA").separator("__"))
            .build()?;
        let config = config.try_deserialize()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config() {
        let config = AppConfig::load("Config").unwrap();
        assert_eq!(config.crawl.page_size, 52);
        assert_eq!(config.proxy.auth_mode, ProxyAuthMode::Authenticated);
        assert!(config.crawl.concurrency > 0);
    }

    #[test]
    fn test_defaults() {
        let raw = r#"
            [proxy]
            api_url = "http://127.0.0.1/api"
            auth_mode = "allow_listed"

            [crawl]
            start_url = "http://127.0.0.1/list.psp"
            listing_url = "http://127.0.0.1/query"
            base_url = "http://127.0.0.1"
            conditions = "[]"
            orders = "[]"
            return_infos = "[]"
            school = "test"

            [db]
            driver = "memory"
            connection_string = ""
            table_name = "faculty"
            max_connections = 1

            [log]
            console_levels = ["info"]
        "#;
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.proxy.auth_mode, ProxyAuthMode::AllowListed);
        assert_eq!(config.proxy.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.proxy.fallback, "127.0.0.1:7890");
        assert_eq!(config.crawl.query_obj, "teacherHome");
        assert_eq!(config.crawl.detail_retries, 0);
        assert_eq!(config.log.file, "logs/crawl.log");
    }
}
