mod common;
mod db;
mod fetcher;
mod model;
mod service;

use crate::common::log::init_logging;
use crate::db::{RecordSink, StorageBackend};
use crate::fetcher::KdlProxySource;
use crate::model::AppConfig;
use crate::service::crawler::Crawler;
use crate::service::dispatcher::RequestDispatcher;
use crate::service::extractor::FieldExtractor;
use crate::service::proxy_pool::ProxyPool;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 配置文件名可由第一个参数指定，默认读取 Config.toml
    let config_name = std::env::args().nth(1).unwrap_or_else(|| "Config".to_string());
    let config = AppConfig::load(&config_name)?;
    init_logging(&config.log)?;

    info!("========== [代理池初始化] ==========");
    let source = Arc::new(KdlProxySource::new(&config.proxy.api_url, config.proxy.api_timeout()));
    let pool = Arc::new(ProxyPool::new(source, &config.proxy));
    let count = pool.refresh().await;
    info!("代理池初始化完成，当前代理数量: {}", count);
    if pool.is_empty() {
        warn!("代理池为空，请求将直连目标站点");
    }
    let refresher = pool.start(config.proxy.refresh_interval());

    let storage: Arc<StorageBackend> = Arc::new(StorageBackend::new(&config.db).await?);
    let dispatcher = Arc::new(
        RequestDispatcher::new(Arc::clone(&pool), config.crawl.request_timeout())
            .with_download_delay(config.crawl.download_delay()),
    );
    let extractor = Arc::new(FieldExtractor::new(&config.crawl.school, &config.crawl.school_level)?);
    let crawler = Crawler::new(config.crawl.clone(), dispatcher, extractor, storage.clone())?;

    let result = crawler.run().await;
    refresher.stop().await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("爬取终止：{}", e);
            return Err(e.into());
        }
    };

    info!("========== [结果统计] ==========");
    info!(
        "列表页 {:?}（总页数 {}），入库 {} 条，跳过 {} 条，代理失败 {} 次，库中共 {} 条",
        report.listing_pages,
        report.total_pages,
        report.records_emitted,
        report.skipped_details,
        pool.failure_count(),
        storage.count_records().await?
    );
    if let Some(page) = report.halted_at_page {
        info!("列表翻页在第 {} 页提前终止", page);
    }

    Ok(())
}
