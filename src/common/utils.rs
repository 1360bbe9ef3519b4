use once_cell::sync::Lazy;
use regex::Regex;
use tracing::Level;

static PROXY_ADDR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9.\-]+:\d{1,5}$").expect("valid proxy regex"));

/// 代理地址是否形如 `host:port`。
pub fn is_proxy_addr(s: &str) -> bool {
    PROXY_ADDR.is_match(s)
}

/// 去掉每段文本首尾空白，丢弃空段后以单个空格拼接。
pub fn join_fragments<'a, I>(fragments: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    fragments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 表名基本校验
pub fn validate_table_name(name: &str) -> bool {
    // 限定表名为英文字母、下划线、数字，且不能以数字开头
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.chars().next().map(|c| !c.is_ascii_digit()).unwrap_or(false)
}

// 把字符串转换成 Level，忽略大小写，不识别时返回 None
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_proxy_addr() {
        assert!(is_proxy_addr("113.124.86.24:16818"));
        assert!(is_proxy_addr("proxy.example.com:8080"));
        assert!(!is_proxy_addr("113.124.86.24"));
        assert!(!is_proxy_addr("http://1.2.3.4:80"));
        assert!(!is_proxy_addr(""));
    }

    #[test]
    fn test_join_fragments() {
        let joined = join_fragments(vec!["  机器学习 ", "\n", "", " 数据库\t"]);
        assert_eq!(joined, "机器学习 数据库");
        assert_eq!(join_fragments(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("faculty"));
        assert!(validate_table_name("faculty_2025"));
        assert!(validate_table_name("_faculty"));
        assert!(!validate_table_name("2faculty"));
        assert!(!validate_table_name("faculty;drop"));
        assert!(!validate_table_name(""));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("Info"), Some(Level::INFO));
        assert_eq!(parse_level("verbose"), None);
    }
}
