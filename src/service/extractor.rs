//! # extractor 模块
//!
//! 从教师详情页中解析邮箱与研究方向。
//!
//! 详情页结构并不统一，所以每个字段都对应一条有序的策略链：
//! 依次尝试，第一个返回非空结果的策略胜出；全部落空时字段记为空串，不视为错误。
//! 链中的顺序代表结构假设由强到弱，新增策略只需往链里追加实现。

use crate::common::error::CrawlError;
use crate::common::utils::join_fragments;
use crate::model::{ExtractedRecord, ListingRecord};
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// 研究方向板块标题中的标记文字。
pub const RESEARCH_MARKER: &str = "研究方向";

/// 个人信息表格中邮箱所在的固定位置。
const EMAIL_PATH: &str = "#container-1 > div > div > div:nth-of-type(2) > div:nth-of-type(1) > div > table > tbody > tr > td > div:nth-of-type(1) > div:nth-of-type(1) > div:nth-of-type(2) > ul:nth-of-type(2) > li:nth-of-type(2) > span:nth-of-type(2)";

/// 单个字段的一种提取方式。
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 返回 `None` 或空串都表示本策略未命中。
    fn attempt(&self, doc: &Html) -> Option<String>;
}

/// 有序策略链。
pub struct StrategyChain {
    field: &'static str,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl StrategyChain {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            strategies: Vec::new(),
        }
    }

    pub fn then(mut self, strategy: impl ExtractionStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn resolve(&self, doc: &Html) -> String {
        for strategy in &self.strategies {
            if let Some(value) = strategy.attempt(doc).map(|v| v.trim().to_string()) {
                if !value.is_empty() {
                    debug!("{} 由策略 {} 解析成功", self.field, strategy.name());
                    return value;
                }
            }
        }
        debug!("{} 所有策略均未命中，记为空", self.field);
        String::new()
    }
}

fn selector(css: &str) -> Result<Selector, CrawlError> {
    Selector::parse(css).map_err(|e| CrawlError::Selector(format!("{}: {}", css, e)))
}

/// 元素自身（不含子元素）的文本。
fn own_text(el: &ElementRef) -> String {
    el.children()
        .filter_map(|n| n.value().as_text())
        .map(|t| &**t)
        .collect()
}

fn class_contains(el: &ElementRef, needle: &str) -> bool {
    el.value().attr("class").map(|c| c.contains(needle)).unwrap_or(false)
}

fn collect_text(el: &ElementRef) -> String {
    join_fragments(el.text())
}

/// 邮箱策略一：按固定的嵌套表格位置取值。
pub struct EmailByPath {
    path: Selector,
}

impl EmailByPath {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self { path: selector(EMAIL_PATH)? })
    }
}

impl ExtractionStrategy for EmailByPath {
    fn name(&self) -> &'static str {
        "email_by_path"
    }

    fn attempt(&self, doc: &Html) -> Option<String> {
        doc.select(&self.path).next().map(|el| own_text(&el))
    }
}

/// 邮箱策略二：第一个自身文本中含 `@` 的 `span`。
pub struct EmailByAt {
    span: Selector,
}

impl EmailByAt {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self { span: selector("span")? })
    }
}

impl ExtractionStrategy for EmailByAt {
    fn name(&self) -> &'static str {
        "email_by_at"
    }

    fn attempt(&self, doc: &Html) -> Option<String> {
        doc.select(&self.span)
            .map(|el| own_text(&el))
            .find(|text| text.contains('@'))
    }
}

/// 研究方向策略一：`class` 恰为 `title` 且文本含标记的 `span`，
/// 取其所有 `class` 含 `post` 的祖先 `div` 下 `class` 恰为 `con` 的内容。
pub struct ResearchBySection {
    title: Selector,
    div: Selector,
}

impl ResearchBySection {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self {
            title: selector(r#"span[class="title"]"#)?,
            div: selector(r#"div[class="con"]"#)?,
        })
    }
}

impl ExtractionStrategy for ResearchBySection {
    fn name(&self) -> &'static str {
        "research_by_section"
    }

    fn attempt(&self, doc: &Html) -> Option<String> {
        let posts: Vec<_> = doc
            .select(&self.title)
            .filter(|t| own_text(t).contains(RESEARCH_MARKER))
            .flat_map(|t| t.ancestors().filter_map(ElementRef::wrap).collect::<Vec<_>>())
            .filter(|a| a.value().name() == "div" && class_contains(a, "post"))
            .map(|a| a.id())
            .collect();
        if posts.is_empty() {
            return None;
        }

        let fragments: Vec<String> = doc
            .select(&self.div)
            .filter(|con| con.ancestors().any(|a| posts.contains(&a.id())))
            .map(|con| collect_text(&con))
            .collect();
        Some(join_fragments(fragments.iter().map(String::as_str)))
    }
}

/// 研究方向策略二：遍历所有 `span.title`，找到含标记的标题后，
/// 取最近的 `class` 含 `post` 的祖先 `div` 中的 `div.con` 内容。
pub struct ResearchByHeading {
    heading: Selector,
    con: Selector,
}

impl ResearchByHeading {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self {
            heading: selector("span.title")?,
            con: selector("div.con")?,
        })
    }
}

impl ExtractionStrategy for ResearchByHeading {
    fn name(&self) -> &'static str {
        "research_by_heading"
    }

    fn attempt(&self, doc: &Html) -> Option<String> {
        for heading in doc.select(&self.heading) {
            // 标题文字可能包在 strong/b 等子元素里
            if !heading.text().collect::<String>().contains(RESEARCH_MARKER) {
                continue;
            }
            let post = heading
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|a| a.value().name() == "div" && class_contains(a, "post"));
            if let Some(post) = post {
                let parts: Vec<String> = post.select(&self.con).map(|con| collect_text(&con)).collect();
                let text = join_fragments(parts.iter().map(String::as_str));
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
        None
    }
}

/// 研究方向策略三：遍历所有 `div.maincon`，全文含标记即取其中 `div.con` 的内容。
pub struct ResearchByBlock {
    block: Selector,
    con: Selector,
}

impl ResearchByBlock {
    pub fn new() -> Result<Self, CrawlError> {
        Ok(Self {
            block: selector("div.maincon")?,
            con: selector("div.con")?,
        })
    }
}

impl ExtractionStrategy for ResearchByBlock {
    fn name(&self) -> &'static str {
        "research_by_block"
    }

    fn attempt(&self, doc: &Html) -> Option<String> {
        doc.select(&self.block)
            .filter(|block| block.text().collect::<String>().contains(RESEARCH_MARKER))
            .map(|block| {
                let parts: Vec<String> = block.select(&self.con).map(|con| collect_text(&con)).collect();
                join_fragments(parts.iter().map(String::as_str))
            })
            .find(|text| !text.is_empty())
    }
}

/// 详情页字段解析器。
pub struct FieldExtractor {
    email: StrategyChain,
    research: StrategyChain,
    school: String,
    school_level: String,
}

impl FieldExtractor {
    pub fn new(school: &str, school_level: &str) -> Result<Self, CrawlError> {
        let email = StrategyChain::new("email")
            .then(EmailByPath::new()?)
            .then(EmailByAt::new()?);
        let research = StrategyChain::new("research")
            .then(ResearchBySection::new()?)
            .then(ResearchByHeading::new()?)
            .then(ResearchByBlock::new()?);
        Ok(Self::with_chains(email, research, school, school_level))
    }

    pub fn with_chains(
        email: StrategyChain,
        research: StrategyChain,
        school: &str,
        school_level: &str,
    ) -> Self {
        Self {
            email,
            research,
            school: school.to_string(),
            school_level: school_level.to_string(),
        }
    }

    /// 合并列表字段与详情页解析结果，生成完整记录。
    pub fn extract(&self, listing: &ListingRecord, body: &str) -> ExtractedRecord {
        let doc = Html::parse_document(body);
        ExtractedRecord {
            name: listing.name.clone(),
            title: listing.title.clone(),
            school_college: listing.school_college.clone(),
            school: self.school.clone(),
            school_level: self.school_level.clone(),
            url: listing.url.clone(),
            email: self.email.resolve(&doc),
            research: self.research.resolve(&doc),
            crawled_at: Utc::now().naive_utc(),
        }
    }
}
