use crate::common::error::CrawlError;
use crate::db::manager::RecordSink;
use crate::model::ExtractedRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// 进程内存储，按 URL 去重，适合试跑与测试。
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<String, ExtractedRecord>>,
}

#[async_trait]
impl RecordSink for MemoryStorage {
    async fn upsert_record(&self, record: &ExtractedRecord) -> Result<(), CrawlError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.url.clone(), record.clone());
        Ok(())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<ExtractedRecord>, CrawlError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned())
    }

    async fn count_records(&self) -> Result<u64, CrawlError> {
        Ok(self.records.lock().unwrap_or_else(PoisonError::into_inner).len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(url: &str, email: &str) -> ExtractedRecord {
        ExtractedRecord {
            name: "王五".into(),
            title: "副教授".into(),
            school_college: "软件工程学院".into(),
            school: "华东师范大学".into(),
            school_level: "中9".into(),
            url: url.into(),
            email: email.into(),
            research: String::new(),
            crawled_at: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn test_reingest_does_not_grow() {
        let storage = MemoryStorage::default();
        storage.upsert_record(&record("https://x/a", "")).await.unwrap();
        storage.upsert_record(&record("https://x/a", "a@x.cn")).await.unwrap();
        storage.upsert_record(&record("https://x/b", "")).await.unwrap();

        assert_eq!(storage.count_records().await.unwrap(), 2);
        let a = storage.find_by_url("https://x/a").await.unwrap().unwrap();
        assert_eq!(a.email, "a@x.cn");
    }
}
