use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 列表接口返回的一页数据：`{ data: [...], pageCount }`。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingPage {
    #[serde(default)]
    pub data: Vec<ListingItem>,
    /// 服务端报告的总页数，缺失时视为 0
    #[serde(default, rename = "pageCount")]
    pub page_count: u32,
}

/// 列表中的单条记录，字段缺失时为空串。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingItem {
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "cnUrl")]
    pub cn_url: String,
    #[serde(default)]
    pub post: String,
    #[serde(default)]
    pub department: String,
}

/// 列表阶段能拿到的最少字段，用来构造详情请求，不直接入库。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    pub name: String,
    pub title: String,
    pub school_college: String,
    /// 已按 base_url 解析的详情页地址，同时作为记录的自然键
    pub url: String,
    /// 产生该记录的列表页码，仅用于诊断日志
    pub page: u32,
}

/// 最终入库的教师信息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExtractedRecord {
    pub name: String,
    pub title: String,
    pub school_college: String,
    pub school: String,
    pub school_level: String,
    pub url: String,
    /// 未解析到时为空串
    pub email: String,
    /// 研究方向，未解析到时为空串
    pub research: String,
    pub crawled_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_page_defaults() {
        let page: ListingPage = serde_json::from_str(
            r#"{"data":[{"title":"张三","cnUrl":"/zs/index.htm","post":"教授"},{"title":"李四"}]}"#,
        )
        .unwrap();
        assert_eq!(page.page_count, 0);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].cn_url, "/zs/index.htm");
        assert_eq!(page.data[0].department, "");
        assert_eq!(page.data[1].cn_url, "");
    }
}
