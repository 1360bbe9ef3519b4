//! 存储模块：教师记录的幂等写入接口。
//!
//! 支持的后端：SQLite（`sqlite` 特性，默认启用）与进程内内存存储。
//! 提供统一的异步 trait [`RecordSink`]，通过 [`StorageBackend`] 多态调度。
use crate::common::error::CrawlError;
use crate::db::memory::MemoryStorage;
#[cfg(feature = "sqlite")]
use crate::db::sqlite::SqliteStorage;
use crate::model::{DbConfig, ExtractedRecord};
use async_trait::async_trait;

/// 记录落地接口，以来源 URL 作为自然键。
///
/// 同一 URL 重复写入只会覆盖已有记录，不会新增。
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// 插入或更新一条记录。
    async fn upsert_record(&self, record: &ExtractedRecord) -> Result<(), CrawlError>;

    async fn find_by_url(&self, url: &str) -> Result<Option<ExtractedRecord>, CrawlError>;

    async fn count_records(&self) -> Result<u64, CrawlError>;
}

#[derive(Debug)]
pub enum StorageBackend {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteStorage),

    Memory(MemoryStorage),
}

impl StorageBackend {
    /// 依据 `db.driver`（"sqlite" / "memory"）创建对应的存储后端。
    pub async fn new(config: &DbConfig) -> Result<Self, CrawlError> {
        match config.driver.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => Ok(Self::Sqlite(SqliteStorage::new(config).await?)),
            "memory" => Ok(Self::Memory(MemoryStorage::default())),
            other => Err(CrawlError::Config(format!("不支持的存储类型：{}", other))),
        }
    }
}

#[async_trait]
impl RecordSink for StorageBackend {
    async fn upsert_record(&self, record: &ExtractedRecord) -> Result<(), CrawlError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(s) => s.upsert_record(record).await,
            Self::Memory(s) => s.upsert_record(record).await,
        }
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<ExtractedRecord>, CrawlError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(s) => s.find_by_url(url).await,
            Self::Memory(s) => s.find_by_url(url).await,
        }
    }

    async fn count_records(&self) -> Result<u64, CrawlError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(s) => s.count_records().await,
            Self::Memory(s) => s.count_records().await,
        }
    }
}
