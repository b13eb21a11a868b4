use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Common list-endpoint query parameters. `page` is 1-based; `pageSize` is
/// passed through as supplied by the caller.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

pub fn default_page() -> i64 {
    1
}

pub fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

/// SQL OFFSET for a 1-based page. Pages below 1 clamp to the first page.
pub fn offset(page: i64, page_size: i64) -> i64 {
    (page.max(1) - 1) * page_size.max(0)
}

/// Response headers echoing the page of results: X-Total-Count, X-Page,
/// X-Page-Size.
pub fn page_headers(total_count: i64, page: i64, page_size: i64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-total-count"),
        HeaderValue::from(total_count),
    );
    headers.insert(HeaderName::from_static("x-page"), HeaderValue::from(page));
    headers.insert(
        HeaderName::from_static("x-page-size"),
        HeaderValue::from(page_size),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_first_page() {
        assert_eq!(offset(1, 20), 0);
    }

    #[test]
    fn test_offset_later_page() {
        assert_eq!(offset(3, 25), 50);
    }

    #[test]
    fn test_offset_clamps_below_one() {
        assert_eq!(offset(0, 20), 0);
        assert_eq!(offset(-5, 20), 0);
    }

    #[test]
    fn test_page_headers() {
        let headers = page_headers(42, 2, 20);
        assert_eq!(headers["x-total-count"], "42");
        assert_eq!(headers["x-page"], "2");
        assert_eq!(headers["x-page-size"], "20");
    }
}
