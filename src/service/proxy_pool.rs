//! # proxy_pool 模块
//!
//! 维护当前可用的出口代理集合，并在后台定时从代理分配 API 刷新。
//!
//! - 刷新成功：整体替换代理集合（不做合并）；
//! - 刷新失败：保留上一次的集合不变，首次失败时回退到本地代理；
//! - 读取方只拿到 `Arc` 快照，读写之间仅在交换引用时短暂持锁，
//!   因此任意一次 [`ProxyPool::select`] 看到的要么是旧集合、要么是新集合。

use crate::common::error::{FetchError, ProxyRefreshError};
use crate::fetcher::ProxySource;
use crate::model::{ProxyAuthMode, ProxyConfig, ProxyCredential, ProxyEntry};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 不可变的代理集合快照。
pub type ProxySet = Arc<Vec<ProxyEntry>>;

pub struct ProxyPool {
    source: Arc<dyn ProxySource>,
    current: RwLock<ProxySet>,
    /// 是否已经发布过任何一次集合（包括回退集合）
    published: AtomicBool,
    credential: Option<ProxyCredential>,
    fallback: String,
    failures: AtomicUsize,
}

impl ProxyPool {
    pub fn new(source: Arc<dyn ProxySource>, config: &ProxyConfig) -> Self {
        let credential = match config.auth_mode {
            ProxyAuthMode::Authenticated if !config.username.is_empty() => Some(ProxyCredential {
                username: config.username.clone(),
                password: config.password.clone(),
            }),
            ProxyAuthMode::Authenticated => {
                warn!("代理配置为用户名密码认证，但未提供用户名，按白名单方式连接");
                None
            }
            ProxyAuthMode::AllowListed => None,
        };

        Self {
            source,
            current: RwLock::new(Arc::new(Vec::new())),
            published: AtomicBool::new(false),
            credential,
            fallback: config.fallback.clone(),
            failures: AtomicUsize::new(0),
        }
    }

    /// 从分配 API 拉取新代理并整体替换当前集合，返回刷新后的集合大小。
    ///
    /// 失败不会清空已有集合；若此前从未发布过集合，则发布只含本地回退代理的集合。
    pub async fn refresh(&self) -> usize {
        match self.source.allocate().await {
            Ok(list) => {
                let set: Vec<ProxyEntry> = list
                    .iter()
                    .map(|addr| ProxyEntry::new(addr).with_credential(self.credential.clone()))
                    .collect();
                let len = set.len();
                self.publish(set);
                info!("代理列表已更新，当前有 {} 个代理", len);
                len
            }
            Err(e) => self.on_refresh_failure(e),
        }
    }

    fn on_refresh_failure(&self, e: ProxyRefreshError) -> usize {
        if self.published.load(Ordering::Acquire) {
            let len = self.len();
            error!("获取代理失败，保留现有 {} 个代理：{}", len, e);
            len
        } else {
            error!("获取代理失败，使用备用代理 {}：{}", self.fallback, e);
            let fallback = ProxyEntry::new(&self.fallback).with_credential(self.credential.clone());
            self.publish(vec![fallback]);
            1
        }
    }

    fn publish(&self, set: Vec<ProxyEntry>) {
        let set = Arc::new(set);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = set;
        self.published.store(true, Ordering::Release);
    }

    /// 当前集合的快照。
    pub fn snapshot(&self) -> ProxySet {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// 从当前集合中均匀随机选出一个代理；集合为空时返回 `None`，调用方直连。
    pub fn select(&self) -> Option<ProxyEntry> {
        let set = self.snapshot();
        if set.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..set.len());
        Some(set[idx].clone())
    }

    /// 记录一次经由该代理的请求失败。代理不会被移除，下次刷新时自然淘汰。
    pub fn report_failure(&self, entry: &ProxyEntry, err: &FetchError) {
        let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("代理 {} 请求失败 [{}]：{}（累计 {} 次）", entry.addr, err.kind(), err, total);
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// 启动后台刷新任务，每隔 `interval` 刷新一次。
    ///
    /// 停止信号只在等待间隔时生效，不会打断正在进行的刷新请求。
    pub fn start(self: &Arc<Self>, interval: Duration) -> RefreshHandle {
        let token = CancellationToken::new();
        let pool = Arc::clone(self);
        let stop = token.clone();

        info!("启动代理IP池刷新服务，间隔 {:?}", interval);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let count = pool.refresh().await;
                info!("代理池已刷新，当前代理数量: {}", count);
            }
        });

        RefreshHandle { token, handle }
    }
}

/// 后台刷新任务的句柄。
pub struct RefreshHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshHandle {
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!("代理刷新任务异常退出：{}", e);
        }
        info!("代理IP池刷新服务已停止");
    }
}
