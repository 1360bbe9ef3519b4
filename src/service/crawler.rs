//! # crawler 模块
//!
//! 教师目录爬取状态机：
//!
//! ```text
//! Bootstrapping → ListingFetch(n) → DetailFanOut(n) → ListingFetch(n+1) | Done
//! ```
//!
//! - 会话初始化失败是唯一的致命错误；
//! - 列表页请求或解析失败时停止翻页，已入库的记录保留；
//! - 单个详情页失败只跳过该条记录。
//!
//! 列表页严格串行（总页数只有解析后才知道），详情页在信号量限制下并发执行，完成顺序不定。

use crate::common::error::{CrawlError, FetchError};
use crate::db::RecordSink;
use crate::model::{CrawlConfig, FetchedResponse, ListingPage, ListingRecord, RequestTask, Stage};
use crate::service::dispatcher::Dispatch;
use crate::service::extractor::FieldExtractor;
use reqwest::header::CONTENT_TYPE;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const HTML_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";
const JSON_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";
const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9";

/// 翻页游标：当前页码与最近一次服务端报告的总页数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlCursor {
    pub page: u32,
    pub total_pages: u32,
}

impl Default for CrawlCursor {
    fn default() -> Self {
        Self { page: 1, total_pages: 0 }
    }
}

impl CrawlCursor {
    /// 记录当前页解析出的总页数；还有下一页时游标前进一页并返回新页码。
    pub fn advance(&mut self, total_pages: u32) -> Option<u32> {
        self.total_pages = total_pages;
        if self.total_pages > self.page {
            self.page += 1;
            Some(self.page)
        } else {
            None
        }
    }
}

enum CrawlState {
    Bootstrapping,
    ListingFetch { page: u32 },
    DetailFanOut { page: u32, records: Vec<ListingRecord>, total_pages: u32 },
    Done,
}

/// 一次爬取的汇总。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// 按请求顺序记录的列表页码
    pub listing_pages: Vec<u32>,
    pub total_pages: u32,
    pub records_emitted: usize,
    pub skipped_details: usize,
    /// 列表翻页提前终止时所在的页码
    pub halted_at_page: Option<u32>,
}

#[derive(Default)]
struct DetailStats {
    emitted: AtomicUsize,
    skipped: AtomicUsize,
}

pub struct Crawler {
    config: CrawlConfig,
    base: reqwest::Url,
    dispatcher: Arc<dyn Dispatch>,
    extractor: Arc<FieldExtractor>,
    sink: Arc<dyn RecordSink>,
    semaphore: Arc<Semaphore>,
}

impl Crawler {
    pub fn new(
        config: CrawlConfig,
        dispatcher: Arc<dyn Dispatch>,
        extractor: Arc<FieldExtractor>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, CrawlError> {
        let base = reqwest::Url::parse(&config.base_url)
            .map_err(|e| CrawlError::Config(format!("base_url 无效 {}：{}", config.base_url, e)))?;
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Ok(Self {
            config,
            base,
            dispatcher,
            extractor,
            sink,
            semaphore,
        })
    }

    /// 执行完整的爬取流程。只有会话初始化失败会返回错误。
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        let started = Instant::now();
        let mut report = CrawlReport::default();
        let mut cursor = CrawlCursor::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut details = JoinSet::new();
        let stats = Arc::new(DetailStats::default());

        let mut state = CrawlState::Bootstrapping;
        loop {
            state = match state {
                CrawlState::Bootstrapping => {
                    self.bootstrap().await?;
                    CrawlState::ListingFetch { page: cursor.page }
                }
                CrawlState::ListingFetch { page } => {
                    report.listing_pages.push(page);
                    match self.fetch_listing(page).await {
                        Ok(listing) => {
                            let total_pages = listing.page_count;
                            let records = self.to_records(page, listing, &mut seen, &stats);
                            info!("📄 第 {}/{} 页列表解析完成，待抓取详情 {} 条", page, total_pages, records.len());
                            CrawlState::DetailFanOut { page, records, total_pages }
                        }
                        Err(e) => {
                            error!("❌ {}，停止翻页", e);
                            report.halted_at_page = Some(page);
                            CrawlState::Done
                        }
                    }
                }
                CrawlState::DetailFanOut { page, records, total_pages } => {
                    for record in records {
                        self.spawn_detail(&mut details, record, Arc::clone(&stats));
                    }
                    report.total_pages = total_pages;
                    match cursor.advance(total_pages) {
                        Some(next) => CrawlState::ListingFetch { page: next },
                        None => {
                            info!("已到达最后一页（第 {} 页）", page);
                            CrawlState::Done
                        }
                    }
                }
                CrawlState::Done => break,
            };
        }

        while let Some(joined) = details.join_next().await {
            if let Err(e) = joined {
                error!("详情任务异常退出：{}", e);
                stats.skipped.fetch_add(1, Ordering::SeqCst);
            }
        }

        report.records_emitted = stats.emitted.load(Ordering::SeqCst);
        report.skipped_details = stats.skipped.load(Ordering::SeqCst);

        info!("========== [爬取完成 ✅] ==========");
        info!(
            "列表页 {} 页，入库 {} 条，跳过 {} 条，耗时 {}s",
            report.listing_pages.len(),
            report.records_emitted,
            report.skipped_details,
            started.elapsed().as_secs()
        );
        if let Some(page) = report.halted_at_page {
            warn!("列表翻页在第 {} 页提前终止", page);
        }
        Ok(report)
    }

    async fn bootstrap(&self) -> Result<(), CrawlError> {
        info!("========== [会话初始化] ==========");
        let task = RequestTask::get(&self.config.start_url, Stage::Bootstrap)
            .header("Accept", HTML_ACCEPT)
            .header("Accept-Language", ACCEPT_LANGUAGE);

        let _permit = self.semaphore.acquire().await.ok();
        self.dispatcher.execute(task).await.map_err(|e| {
            error!("❌ 访问主页失败，无法建立会话：{}", e);
            CrawlError::SessionBootstrap(e)
        })?;
        info!("已访问主页，开始发送列表请求");
        Ok(())
    }

    fn listing_task(&self, page: u32) -> RequestTask {
        let url = format!("{}?queryObj={}", self.config.listing_url, self.config.query_obj);
        let form = vec![
            ("pageIndex".to_string(), page.to_string()),
            ("rows".to_string(), self.config.page_size.to_string()),
            ("conditions".to_string(), self.config.conditions.clone()),
            ("orders".to_string(), self.config.orders.clone()),
            ("returnInfos".to_string(), self.config.return_infos.clone()),
            ("articleType".to_string(), "1".to_string()),
            ("level".to_string(), "0".to_string()),
            ("pageEvent".to_string(), "doSearchByPage".to_string()),
        ];
        RequestTask::post_form(url, form, Stage::Listing { page })
            .header("Accept", JSON_ACCEPT)
            .header("Accept-Language", ACCEPT_LANGUAGE)
            .header("Origin", self.base.origin().ascii_serialization().as_str())
            .header("Referer", &self.config.start_url)
            .header("X-Requested-With", "XMLHttpRequest")
    }

    async fn fetch_listing(&self, page: u32) -> Result<ListingPage, CrawlError> {
        let resp: FetchedResponse = {
            let _permit = self.semaphore.acquire().await.ok();
            self.dispatcher
                .execute(self.listing_task(page))
                .await
                .map_err(|source| CrawlError::ListingFetch { page, source })?
        };
        debug!(
            "[listing#{}] {} {}，Content-Type: {:?}",
            page,
            resp.status,
            resp.url,
            resp.headers.get(CONTENT_TYPE)
        );
        serde_json::from_str(&resp.body).map_err(|source| CrawlError::ListingParse { page, source })
    }

    /// 列表条目转为详情任务所需的记录；空地址与本次运行中已调度过的地址不会再次调度。
    fn to_records(
        &self,
        page: u32,
        listing: ListingPage,
        seen: &mut HashSet<String>,
        stats: &DetailStats,
    ) -> Vec<ListingRecord> {
        let mut records = Vec::with_capacity(listing.data.len());
        for item in listing.data {
            let cn_url = item.cn_url.trim();
            if cn_url.is_empty() {
                warn!("⏭️ [第 {} 页] {} 缺少详情页地址，跳过", page, item.title);
                stats.skipped.fetch_add(1, Ordering::SeqCst);
                continue;
            }
            let url = match self.base.join(cn_url) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    warn!("⏭️ [第 {} 页] {} 详情页地址无效 {}：{}", page, item.title, cn_url, e);
                    stats.skipped.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
            };
            if !seen.insert(url.clone()) {
                info!("[第 {} 页] {} 已调度过，忽略重复条目", page, url);
                continue;
            }
            records.push(ListingRecord {
                name: item.title,
                title: item.post,
                school_college: item.department,
                url,
                page,
            });
        }
        records
    }

    fn spawn_detail(&self, set: &mut JoinSet<()>, record: ListingRecord, stats: Arc<DetailStats>) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let extractor = Arc::clone(&self.extractor);
        let sink = Arc::clone(&self.sink);
        let semaphore = Arc::clone(&self.semaphore);
        let retries = self.config.detail_retries;

        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let label = format!("[第 {} 页 {}]", record.page, record.name);

            let resp = match fetch_detail(dispatcher.as_ref(), &record, retries).await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("⏭️ {} 跳过：{}", label, e);
                    stats.skipped.fetch_add(1, Ordering::SeqCst);
                    return;
                }
            };

            debug!("{} {} {}", label, resp.status, resp.url);
            let item = extractor.extract(&record, &resp.body);
            let existed = matches!(sink.find_by_url(&item.url).await, Ok(Some(_)));
            match sink.upsert_record(&item).await {
                Ok(()) => {
                    stats.emitted.fetch_add(1, Ordering::SeqCst);
                    if existed {
                        info!("🔄 {} 已存在，更新成功，邮箱：{}", label, item.email);
                    } else {
                        info!("🟢 {} 入库成功，邮箱：{}", label, item.email);
                    }
                }
                Err(e) => {
                    error!("❌ {} 入库失败，跳过：{}", label, e);
                    stats.skipped.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
    }
}

/// 请求详情页。仅瞬时错误会重试，每次重试都会重新挑选代理。
async fn fetch_detail(
    dispatcher: &dyn Dispatch,
    record: &ListingRecord,
    retries: u32,
) -> Result<FetchedResponse, CrawlError> {
    let task = RequestTask::get(&record.url, Stage::Detail(record.clone()))
        .header("Accept", HTML_ACCEPT)
        .header("Accept-Language", ACCEPT_LANGUAGE);

    let mut attempt = 0;
    loop {
        match dispatcher.execute(task.clone()).await {
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                warn!("🔁 {} 第 {} 次重试（{}）", record.url, attempt, e);
            }
            Err(source) => return Err(detail_error(record, source)),
        }
    }
}

fn detail_error(record: &ListingRecord, source: FetchError) -> CrawlError {
    CrawlError::DetailFetch {
        url: record.url.clone(),
        source,
    }
}
