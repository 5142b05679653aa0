//! Selector fallback engine: resolves logical fields from a parsed document
//! via ordered selector chains. A chain entry matches when it selects an
//! element that yields a value for the field's kind (non-empty text, an
//! `href`, or an image URL attribute); the first matching entry wins and
//! later entries are never consulted. An exhausted chain is `NotFound`,
//! which is a valid terminal state, not an error.

use std::sync::OnceLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::source::{FieldKind, SelectorChain};

/// A fetched page parsed for extraction. Keeps the final retrieved URL so
/// relative links resolve correctly after redirects; the configured base URL
/// is never used for resolution.
pub struct Document {
    html: Html,
    final_url: Url,
}

impl Document {
    pub fn parse(body: &str, final_url: Url) -> Self {
        Self {
            html: Html::parse_document(body),
            final_url,
        }
    }

    pub fn final_url(&self) -> &Url {
        &self.final_url
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }
}

/// Result of resolving one field through its chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedField {
    Found(String),
    NotFound,
}

impl ExtractedField {
    pub fn into_option(self) -> Option<String> {
        match self {
            ExtractedField::Found(v) => Some(v),
            ExtractedField::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ExtractedField::Found(_))
    }
}

fn anchor_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("a[href]").expect("static selector"))
}

fn paragraph_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("p").expect("static selector"))
}

/// Collapse all whitespace runs in the element's text to single spaces and
/// trim the ends.
pub fn normalize_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for chunk in el.text() {
        for word in chunk.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

/// Paragraph-preserving text: each `<p>` descendant becomes one collapsed
/// line, joined by blank lines. Elements without paragraphs fall back to
/// plain collapsed text. Used for chapter bodies.
fn block_text(el: ElementRef<'_>) -> String {
    let paragraphs: Vec<String> = el
        .select(paragraph_selector())
        .map(normalize_text)
        .filter(|p| !p.is_empty())
        .collect();
    if paragraphs.is_empty() {
        normalize_text(el)
    } else {
        paragraphs.join("\n\n")
    }
}

fn resolve(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    base.join(raw).ok().map(|u| u.to_string())
}

/// Absolute link for an element: its own `href` if it is an anchor, else the
/// first descendant anchor's. List items are sometimes the `<a>` itself
/// (chapter rows) and sometimes a container around one (catalog cards).
pub fn element_link(el: ElementRef<'_>, base: &Url) -> Option<String> {
    if let Some(href) = el.value().attr("href") {
        return resolve(base, href);
    }
    el.select(anchor_selector())
        .find_map(|a| a.value().attr("href").and_then(|href| resolve(base, href)))
}

fn image_url(el: ElementRef<'_>, base: &Url) -> Option<String> {
    // Lazy-loading themes put the real URL in data-src.
    for attr in ["src", "data-src", "data-lazy-src"] {
        if let Some(value) = el.value().attr(attr).and_then(|v| resolve(base, v)) {
            return Some(value);
        }
    }
    None
}

fn field_value(el: ElementRef<'_>, base: &Url, kind: FieldKind) -> Option<String> {
    match kind {
        FieldKind::Text => {
            let text = normalize_text(el);
            (!text.is_empty()).then_some(text)
        }
        FieldKind::Link => element_link(el, base),
        FieldKind::Image => image_url(el, base),
    }
}

fn chain_value<F>(scope: ElementRef<'_>, chain: &SelectorChain, value: F) -> ExtractedField
where
    F: Fn(ElementRef<'_>) -> Option<String>,
{
    for entry in &chain.entries {
        if let Some(v) = scope.select(&entry.selector).find_map(&value) {
            return ExtractedField::Found(v);
        }
    }
    ExtractedField::NotFound
}

/// Resolve a field from the whole document.
pub fn extract_field(doc: &Document, chain: &SelectorChain) -> ExtractedField {
    extract_field_in(doc.root(), doc.final_url(), chain)
}

/// Resolve a field inside one element (a catalog item, a chapter row).
/// Relative URLs resolve against `base`, the document's final retrieved URL.
pub fn extract_field_in(
    scope: ElementRef<'_>,
    base: &Url,
    chain: &SelectorChain,
) -> ExtractedField {
    chain_value(scope, chain, |el| field_value(el, base, chain.kind))
}

/// Like [extract_field] but with paragraph-preserving text extraction, for
/// chapter bodies where collapsing everything to one line would be useless.
pub fn extract_block_text(doc: &Document, chain: &SelectorChain) -> ExtractedField {
    chain_value(doc.root(), chain, |el| {
        let text = block_text(el);
        (!text.is_empty()).then_some(text)
    })
}

/// All element handles selected by the first chain entry that matches at
/// least one element. Empty when every entry matches nothing; repeated-item
/// fields (chapter rows, catalog entries) treat that as a valid empty list.
pub fn extract_list<'a>(doc: &'a Document, chain: &SelectorChain) -> Vec<ElementRef<'a>> {
    extract_list_in(doc.root(), chain)
}

pub fn extract_list_in<'a>(scope: ElementRef<'a>, chain: &SelectorChain) -> Vec<ElementRef<'a>> {
    for entry in &chain.entries {
        let matches: Vec<ElementRef<'a>> = scope.select(&entry.selector).collect();
        if !matches.is_empty() {
            return matches;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str, final_url: &str) -> Document {
        Document::parse(body, Url::parse(final_url).expect("valid test url"))
    }

    fn chain(kind: FieldKind, entries: &[&str]) -> SelectorChain {
        let raw: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        SelectorChain::parse(kind, &raw).expect("valid test chain")
    }

    #[test]
    fn first_matching_entry_wins_over_later_entries() {
        let d = doc(
            r#"<div class="alt">Fallback Title</div><h1 class="main">Primary Title</h1>"#,
            "https://example.com/book",
        );
        let c = chain(FieldKind::Text, &[".missing", "h1.main", ".alt"]);
        assert_eq!(
            extract_field(&d, &c),
            ExtractedField::Found("Primary Title".to_string())
        );
    }

    #[test]
    fn exhausted_chain_is_not_found() {
        let d = doc("<p>content</p>", "https://example.com/");
        let c = chain(FieldKind::Text, &[".a", ".b"]);
        assert_eq!(extract_field(&d, &c), ExtractedField::NotFound);
    }

    #[test]
    fn extract_list_is_empty_when_nothing_matches() {
        let d = doc("<p>content</p>", "https://example.com/");
        let c = chain(FieldKind::Link, &[".row", ".item"]);
        assert!(extract_list(&d, &c).is_empty());
    }

    #[test]
    fn extract_list_returns_all_matches_of_first_matching_entry() {
        let d = doc(
            r#"<ul><li class="ch">a</li><li class="ch">b</li></ul><div class="other">c</div>"#,
            "https://example.com/",
        );
        let c = chain(FieldKind::Link, &[".missing", "li.ch", ".other"]);
        assert_eq!(extract_list(&d, &c).len(), 2);
    }

    #[test]
    fn text_whitespace_is_collapsed_and_trimmed() {
        let d = doc(
            "<h1>  A   Regressor's \n\t Tale  </h1>",
            "https://example.com/",
        );
        let c = chain(FieldKind::Text, &["h1"]);
        assert_eq!(
            extract_field(&d, &c),
            ExtractedField::Found("A Regressor's Tale".to_string())
        );
    }

    #[test]
    fn relative_links_resolve_against_final_url_not_base() {
        // Final URL is on a mirror host; the link must resolve against it.
        let d = doc(
            r#"<a class="next" href="/list?page=3">next</a>"#,
            "https://mirror.example.net/list?page=2",
        );
        let c = chain(FieldKind::Link, &["a.next"]);
        assert_eq!(
            extract_field(&d, &c),
            ExtractedField::Found("https://mirror.example.net/list?page=3".to_string())
        );
    }

    #[test]
    fn image_falls_back_to_data_src() {
        let d = doc(
            r#"<img class="cover" data-src="/covers/1.jpg">"#,
            "https://example.com/book/1",
        );
        let c = chain(FieldKind::Image, &["img.cover"]);
        assert_eq!(
            extract_field(&d, &c),
            ExtractedField::Found("https://example.com/covers/1.jpg".to_string())
        );
    }

    #[test]
    fn entry_without_value_falls_through_to_next_entry() {
        // First entry matches an img with no usable URL attribute; the chain
        // proceeds to the entry that yields one.
        let d = doc(
            r#"<img class="ph" alt="placeholder"><img class="real" src="/c.png">"#,
            "https://example.com/",
        );
        let c = chain(FieldKind::Image, &["img.ph", "img.real"]);
        assert_eq!(
            extract_field(&d, &c),
            ExtractedField::Found("https://example.com/c.png".to_string())
        );
    }

    #[test]
    fn element_link_uses_own_href_or_first_descendant() {
        let d = doc(
            r#"<a id="self" href="/a">x</a><div id="wrap"><span>t</span><a href="/b">y</a></div>"#,
            "https://example.com/",
        );
        let base = Url::parse("https://example.com/").expect("valid url");
        let self_sel = Selector::parse("#self").expect("selector");
        let wrap_sel = Selector::parse("#wrap").expect("selector");
        let self_el = d.root().select(&self_sel).next().expect("self present");
        let wrap_el = d.root().select(&wrap_sel).next().expect("wrap present");
        assert_eq!(
            element_link(self_el, &base),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(
            element_link(wrap_el, &base),
            Some("https://example.com/b".to_string())
        );
    }

    #[test]
    fn block_text_preserves_paragraph_breaks() {
        let d = doc(
            r#"<div id="c"><p>First  paragraph.</p><p></p><p>Second one.</p></div>"#,
            "https://example.com/",
        );
        let c = chain(FieldKind::Text, &["#c"]);
        assert_eq!(
            extract_block_text(&d, &c),
            ExtractedField::Found("First paragraph.\n\nSecond one.".to_string())
        );
    }
}
