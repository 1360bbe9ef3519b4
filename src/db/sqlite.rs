//! SQLite 存储模块
//!
//! 通过 `SqliteStorage` 封装连接池并实现 [`RecordSink`]，
//! 以详情页 URL 为唯一键做 upsert，重复抓取同一教师不会产生重复行。
//!
//! 表名来自配置，建表前会做合法性校验。

use crate::common::error::CrawlError;
use crate::common::utils::validate_table_name;
use crate::db::manager::RecordSink;
use crate::model::{DbConfig, ExtractedRecord};
use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

#[derive(Debug)]
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
    table: String,
}

impl SqliteStorage {
    pub async fn new(config: &DbConfig) -> Result<Self, CrawlError> {
        if !validate_table_name(&config.table_name) {
            return Err(CrawlError::Config(format!(
                "配置中的表名不合法：{}，请使用字母数字下划线，且不能以数字开头",
                config.table_name
            )));
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string)
            .await?;

        let storage = Self {
            pool,
            table: config.table_name.clone(),
        };
        storage.create_table().await?;
        info!("✅ SQLite 数据库连接成功");
        Ok(storage)
    }

    async fn create_table(&self) -> Result<(), CrawlError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                school_college TEXT NOT NULL DEFAULT '',
                school TEXT NOT NULL DEFAULT '',
                school_level TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL,
                email TEXT NOT NULL DEFAULT '',
                research TEXT NOT NULL DEFAULT '',
                crawled_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(url)
            );
            "#,
            self.table
        ))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for SqliteStorage {
    async fn upsert_record(&self, record: &ExtractedRecord) -> Result<(), CrawlError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (name, title, school_college, school, school_level, url, email, research, crawled_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                name=excluded.name,
                title=excluded.title,
                school_college=excluded.school_college,
                school=excluded.school,
                school_level=excluded.school_level,
                email=excluded.email,
                research=excluded.research,
                crawled_at=excluded.crawled_at
            "#,
            self.table
        ))
            .bind(&record.name)
            .bind(&record.title)
            .bind(&record.school_college)
            .bind(&record.school)
            .bind(&record.school_level)
            .bind(&record.url)
            .bind(&record.email)
            .bind(&record.research)
            .bind(record.crawled_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<ExtractedRecord>, CrawlError> {
        let record = sqlx::query_as::<_, ExtractedRecord>(&format!(
            "SELECT name, title, school_college, school, school_level, url, email, research, crawled_at FROM {} WHERE url = ?",
            self.table
        ))
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn count_records(&self) -> Result<u64, CrawlError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(table: &str) -> DbConfig {
        DbConfig {
            driver: "sqlite".into(),
            connection_string: "sqlite::memory:".into(),
            table_name: table.into(),
            max_connections: 1,
        }
    }

    fn record(url: &str, research: &str) -> ExtractedRecord {
        ExtractedRecord {
            name: "赵六".into(),
            title: "研究员".into(),
            school_college: "数据科学与工程学院".into(),
            school: "华东师范大学".into(),
            school_level: "中9".into(),
            url: url.into(),
            email: "zl@example.edu.cn".into(),
            research: research.into(),
            crawled_at: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_url() {
        let storage = SqliteStorage::new(&config("faculty")).await.unwrap();

        storage.upsert_record(&record("https://f/a.htm", "")).await.unwrap();
        assert_eq!(storage.count_records().await.unwrap(), 1);

        storage.upsert_record(&record("https://f/a.htm", "数据库")).await.unwrap();
        assert_eq!(storage.count_records().await.unwrap(), 1);

        let found = storage.find_by_url("https://f/a.htm").await.unwrap().unwrap();
        assert_eq!(found.research, "数据库");
        assert_eq!(found.email, "zl@example.edu.cn");

        storage.upsert_record(&record("https://f/b.htm", "")).await.unwrap();
        assert_eq!(storage.count_records().await.unwrap(), 2);
        assert!(storage.find_by_url("https://f/none.htm").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_bad_table_name() {
        let result = SqliteStorage::new(&config("1faculty; DROP")).await;
        assert!(matches!(result, Err(CrawlError::Config(_))));
    }
}
