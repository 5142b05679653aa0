//! Canonical data model for extracted catalog and chapter data.
//!
//! All sources produce these shapes; the CLI serializes them as-is. Entities
//! are transient: produced within a single request, returned by value.

use serde::{Deserialize, Serialize};

/// One book entry from a catalog or search page. `url` is always absolute,
/// resolved against the page's final retrieved URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    pub title: String,
    pub url: String,
    #[serde(rename = "coverUrl", skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

/// One chapter row from a book's table of contents. `url` is absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub title: String,
    pub url: String,
}

/// Title and body text extracted from a single chapter page. A missing field
/// means the source's selector chain found nothing, which callers may accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One page of results. `is_last_page` is true iff the page that produced
/// `items` had no "next page" selector match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    #[serde(rename = "pageIndex")]
    pub page_index: u32,
    #[serde(rename = "isLastPage")]
    pub is_last_page: bool,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, page_index: u32, is_last_page: bool) -> Self {
        Self {
            items,
            page_index,
            is_last_page,
        }
    }

    /// A valid empty page. An empty result is not an error; the caller
    /// distinguishes "no results" from "fetch failed".
    pub fn empty(page_index: u32) -> Self {
        Self {
            items: Vec::new(),
            page_index,
            is_last_page: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn book_summary_serializes_cover_url_camel_case() -> Result<(), Box<dyn Error>> {
        let book = BookSummary {
            title: "Mother of Learning".to_string(),
            url: "https://example.com/fiction/1".to_string(),
            cover_url: Some("https://example.com/cover.png".to_string()),
        };
        let json = serde_json::to_string(&book)?;
        assert!(json.contains("\"coverUrl\":"));
        assert!(!json.contains("cover_url"));
        Ok(())
    }

    #[test]
    fn book_summary_omits_missing_cover() -> Result<(), Box<dyn Error>> {
        let book = BookSummary {
            title: "t".to_string(),
            url: "https://example.com/b".to_string(),
            cover_url: None,
        };
        let json = serde_json::to_string(&book)?;
        assert!(!json.contains("coverUrl"));
        Ok(())
    }

    #[test]
    fn paged_result_round_trips_with_camel_case_keys() -> Result<(), Box<dyn Error>> {
        let page = PagedResult::new(
            vec![ChapterSummary {
                title: "Chapter 1".to_string(),
                url: "https://example.com/c/1".to_string(),
            }],
            2,
            false,
        );
        let json = serde_json::to_string(&page)?;
        assert!(json.contains("\"pageIndex\":2"));
        assert!(json.contains("\"isLastPage\":false"));
        let back: PagedResult<ChapterSummary> = serde_json::from_str(&json)?;
        assert_eq!(back, page);
        Ok(())
    }

    #[test]
    fn empty_page_is_last_page() {
        let page = PagedResult::<BookSummary>::empty(0);
        assert!(page.items.is_empty());
        assert_eq!(page.page_index, 0);
        assert!(page.is_last_page);
    }
}
