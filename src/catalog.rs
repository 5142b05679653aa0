//! Catalog, search, and chapter-list building: substitute the page or query
//! into the source's URL template, fetch through the strategy selector, and
//! assemble structured results via the selector fallback engine.
//!
//! A fetch failure is the operation's failure; a fetched page that yields
//! zero items is a valid empty result. Items with missing optional
//! sub-fields are kept with `None` sentinels rather than failing the page.

use crate::error::{Outcome, SourceError};
use crate::extract::{
    element_link, extract_block_text, extract_field, extract_field_in, extract_list,
    normalize_text, Document, ExtractedField,
};
use crate::fetch::SourceFetcher;
use crate::model::{BookSummary, ChapterContent, ChapterSummary, PagedResult};
use crate::source::{Registry, SourceDefinition};

/// The engine's public operation surface: one registry, one fetcher, the
/// per-source operations addressed by source id.
pub struct SourceClient<'a> {
    registry: &'a Registry,
    fetcher: &'a mut dyn SourceFetcher,
}

impl<'a> SourceClient<'a> {
    pub fn new(registry: &'a Registry, fetcher: &'a mut dyn SourceFetcher) -> Self {
        Self { registry, fetcher }
    }

    /// One page of the source's catalog. Page 0 requests the bare catalog
    /// URL; later pages substitute into the `{page}` template.
    pub fn list_catalog(
        &mut self,
        source_id: &str,
        page_index: u32,
    ) -> Outcome<PagedResult<BookSummary>> {
        let source = self.registry.require(source_id)?;
        let url = page_url(&source.catalog_url, page_index);
        let doc = self.fetch_document(source, &url)?;
        Ok(build_book_page(source, &doc, page_index))
    }

    /// One page of search results for `query`.
    pub fn search(
        &mut self,
        source_id: &str,
        page_index: u32,
        query: &str,
    ) -> Outcome<PagedResult<BookSummary>> {
        let source = self.registry.require(source_id)?;
        let template = source
            .search_url
            .as_deref()
            .ok_or_else(|| SourceError::SearchNotConfigured {
                id: source.id.clone(),
            })?;
        let url = search_url(template, query, page_index);
        let doc = self.fetch_document(source, &url)?;
        Ok(build_book_page(source, &doc, page_index))
    }

    /// The full chapter list from a book page. Chapter lists are assumed
    /// fully rendered; there is no pagination here.
    pub fn list_chapters(
        &mut self,
        source_id: &str,
        book_url: &str,
    ) -> Outcome<Vec<ChapterSummary>> {
        let source = self.registry.require(source_id)?;
        let doc = self.fetch_document(source, book_url)?;
        Ok(build_chapter_list(source, &doc))
    }

    /// The book's description text, if the source extracts one.
    pub fn book_description(
        &mut self,
        source_id: &str,
        book_url: &str,
    ) -> Outcome<ExtractedField> {
        let source = self.registry.require(source_id)?;
        let doc = self.fetch_document(source, book_url)?;
        Ok(match &source.selectors.book_description {
            Some(chain) => extract_block_text(&doc, chain),
            None => ExtractedField::NotFound,
        })
    }

    /// Title and body of a single chapter page. Either field may be missing;
    /// the caller decides whether that matters.
    pub fn chapter(&mut self, source_id: &str, chapter_url: &str) -> Outcome<ChapterContent> {
        let source = self.registry.require(source_id)?;
        let doc = self.fetch_document(source, chapter_url)?;
        Ok(ChapterContent {
            title: chapter_title(source, &doc).into_option(),
            text: chapter_text(source, &doc).into_option(),
        })
    }

    fn fetch_document(&mut self, source: &SourceDefinition, url: &str) -> Outcome<Document> {
        let page = self.fetcher.fetch(source, url)?;
        Ok(page.document())
    }
}

/// Chapter title from an already-fetched chapter page.
pub fn chapter_title(source: &SourceDefinition, doc: &Document) -> ExtractedField {
    match &source.selectors.chapter_title {
        Some(chain) => extract_field(doc, chain),
        None => ExtractedField::NotFound,
    }
}

/// Chapter body text, paragraph-preserving, from an already-fetched page.
pub fn chapter_text(source: &SourceDefinition, doc: &Document) -> ExtractedField {
    match &source.selectors.chapter_text {
        Some(chain) => extract_block_text(doc, chain),
        None => ExtractedField::NotFound,
    }
}

fn build_book_page(
    source: &SourceDefinition,
    doc: &Document,
    page_index: u32,
) -> PagedResult<BookSummary> {
    let items = match &source.selectors.book_item {
        Some(chain) => extract_list(doc, chain),
        None => Vec::new(),
    };
    let base = doc.final_url();
    let mut books = Vec::with_capacity(items.len());
    for item in items {
        let url = source
            .selectors
            .book_item_url
            .as_ref()
            .and_then(|chain| extract_field_in(item, base, chain).into_option())
            .or_else(|| element_link(item, base));
        // An item whose target URL cannot be resolved is unrepresentable.
        let Some(url) = url else { continue };
        let title = source
            .selectors
            .book_item_title
            .as_ref()
            .and_then(|chain| extract_field_in(item, base, chain).into_option())
            .unwrap_or_default();
        let cover_url = source
            .selectors
            .book_item_cover
            .as_ref()
            .and_then(|chain| extract_field_in(item, base, chain).into_option());
        books.push(BookSummary {
            title,
            url,
            cover_url,
        });
    }
    let is_last_page = match &source.selectors.next_page {
        Some(chain) => extract_list(doc, chain).is_empty(),
        None => true,
    };
    PagedResult::new(books, page_index, is_last_page)
}

fn build_chapter_list(source: &SourceDefinition, doc: &Document) -> Vec<ChapterSummary> {
    let Some(chain) = &source.selectors.chapter_item else {
        return Vec::new();
    };
    extract_list(doc, chain)
        .into_iter()
        .filter_map(|el| {
            let url = element_link(el, doc.final_url())?;
            Some(ChapterSummary {
                title: normalize_text(el),
                url,
            })
        })
        .collect()
}

/// Substitute a 0-based page index into a catalog template. Sites number
/// their pages from 1, and their first page usually has no page parameter at
/// all, so page 0 requests the template with the placeholder expression
/// stripped (the query pair or path segment that carries it).
pub fn page_url(template: &str, page_index: u32) -> String {
    if !template.contains("{page}") {
        return template.to_string();
    }
    if page_index == 0 {
        strip_page_placeholder(template)
    } else {
        template.replace("{page}", &(page_index + 1).to_string())
    }
}

fn strip_page_placeholder(template: &str) -> String {
    let (base, query) = match template.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (template, None),
    };
    if let Some(query) = query {
        if query.contains("{page}") {
            let kept: Vec<&str> = query.split('&').filter(|p| !p.contains("{page}")).collect();
            return if kept.is_empty() {
                base.to_string()
            } else {
                format!("{}?{}", base, kept.join("&"))
            };
        }
        return format!("{}?{}", strip_page_segment(base), query);
    }
    strip_page_segment(base)
}

/// Drop the `{page}` path segment, plus a preceding literal pager segment
/// (`/page/{page}/`, the WordPress shape).
fn strip_page_segment(path: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        if segment.contains("{page}") {
            if matches!(kept.last().copied(), Some("page") | Some("p")) {
                kept.pop();
            }
            continue;
        }
        kept.push(segment);
    }
    kept.join("/")
}

/// Build a search URL: substitute the percent-encoded query, then apply the
/// same page templating as the catalog.
pub fn search_url(template: &str, query: &str, page_index: u32) -> String {
    let encoded = encode_query(query);
    let with_query = if template.contains("{query}") {
        template.replace("{query}", &encoded)
    } else {
        let mut t = template.to_string();
        t.push_str(&encoded);
        t
    };
    page_url(&with_query, page_index)
}

/// Form-style percent encoding for the query value: unreserved characters
/// pass through, spaces become `+`, everything else is `%XX` per byte.
fn encode_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for byte in query.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
