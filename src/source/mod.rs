//! Per-site source configuration: the declarative description of how to fetch
//! and extract data from one site. Definitions are immutable once compiled;
//! new sites require only new configuration, not new code paths.

mod registry;

pub use registry::Registry;

use reqwest::Url;
use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Language of a source's content, as an ISO 639-1 code on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "id")]
    Indonesian,
    #[serde(rename = "pt")]
    Portuguese,
    #[serde(rename = "zh")]
    Chinese,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Spanish => "es",
            Language::Indonesian => "id",
            Language::Portuguese => "pt",
            Language::Chinese => "zh",
        }
    }
}

/// One retrieval method. A source declares an ordered policy of these; the
/// fetch layer escalates along the policy on anti-bot failure signatures only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStrategy {
    /// Plain HTTP GET with a browser-like header set.
    #[serde(rename = "direct")]
    Direct,
    /// In-process client that can get past basic anti-bot challenges.
    #[serde(rename = "bypass")]
    BypassClient,
    /// External solver service on local loopback. Slow; last resort.
    #[serde(rename = "solver")]
    RemoteSolver,
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FetchStrategy::Direct => "direct",
            FetchStrategy::BypassClient => "bypass",
            FetchStrategy::RemoteSolver => "solver",
        };
        f.write_str(name)
    }
}

/// Default policy when a configuration declares none: direct first, then the
/// in-process bypass client. The solver must be opted into per source.
pub fn default_fetch_policy() -> Vec<FetchStrategy> {
    vec![FetchStrategy::Direct, FetchStrategy::BypassClient]
}

/// What a field's matched element yields: collapsed text, a resolved `href`,
/// or a resolved image URL (`src`, falling back to `data-src` for lazy loads).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Link,
    Image,
}

/// Compiled entry of a selector chain: the raw expression plus its parsed form.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub(crate) raw: String,
    pub(crate) selector: Selector,
}

/// Non-empty ordered sequence of selector expressions for one logical field.
/// Entries are evaluated left to right; the first entry that yields a value
/// wins. Compiled once at registry load; invalid or empty chains are fatal.
#[derive(Debug, Clone)]
pub struct SelectorChain {
    pub(crate) kind: FieldKind,
    pub(crate) entries: Vec<ChainEntry>,
}

impl SelectorChain {
    /// Parse a chain from raw selector expressions. Fails with a reason string
    /// on an empty chain or an expression the CSS parser rejects.
    pub fn parse(kind: FieldKind, expressions: &[String]) -> Result<Self, String> {
        if expressions.is_empty() {
            return Err("chain is empty".to_string());
        }
        let mut entries = Vec::with_capacity(expressions.len());
        for raw in expressions {
            let selector = Selector::parse(raw)
                .map_err(|e| format!("invalid selector {:?}: {}", raw, e))?;
            entries.push(ChainEntry {
                raw: raw.clone(),
                selector,
            });
        }
        Ok(Self { kind, entries })
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compiled selector chains for every extractable field. An absent field is
/// never extracted: it terminates as `NotFound`, not as an error.
#[derive(Debug, Clone, Default)]
pub struct SelectorSet {
    pub book_item: Option<SelectorChain>,
    pub book_item_title: Option<SelectorChain>,
    pub book_item_url: Option<SelectorChain>,
    pub book_item_cover: Option<SelectorChain>,
    pub next_page: Option<SelectorChain>,
    pub chapter_item: Option<SelectorChain>,
    pub chapter_title: Option<SelectorChain>,
    pub chapter_text: Option<SelectorChain>,
    pub book_description: Option<SelectorChain>,
}

/// Immutable per-site configuration, compiled from [SourceConfig]. Owned by
/// the [Registry] for the process lifetime; never mutated in place.
#[derive(Debug, Clone)]
pub struct SourceDefinition {
    pub id: String,
    pub name: String,
    pub base_url: Url,
    /// Catalog URL template; may contain a `{page}` placeholder. Page 0 is
    /// requested with the placeholder expression stripped.
    pub catalog_url: String,
    /// Search URL template with `{query}` (and optionally `{page}`)
    /// placeholders. Absent when the site exposes no search.
    pub search_url: Option<String>,
    pub language: Language,
    pub fetch_policy: Vec<FetchStrategy>,
    pub selectors: SelectorSet,
}

impl SourceDefinition {
    pub fn host(&self) -> &str {
        self.base_url.host_str().unwrap_or_default()
    }
}

/// One selector expression or an ordered fallback list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorSpec {
    One(String),
    Chain(Vec<String>),
}

impl SelectorSpec {
    fn expressions(&self) -> Vec<String> {
        match self {
            SelectorSpec::One(s) => vec![s.clone()],
            SelectorSpec::Chain(v) => v.clone(),
        }
    }
}

/// Wire schema for one source, as stored in a sources JSON file. Kept
/// serializable so external tooling can consume one definition as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub catalog_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_url: Option<String>,
    #[serde(default)]
    pub language: Language,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fetch_policy: Vec<FetchStrategy>,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

/// Wire schema for the per-field selectors. Each value is a single selector
/// string or an ordered list; an absent key means the field is not extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_item: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_item_title: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_item_url: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_item_cover: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_item: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_text: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_description: Option<SelectorSpec>,
}

impl SourceConfig {
    /// Compile the wire config into an immutable definition, parsing the base
    /// URL and every selector chain. Any failure here is a configuration
    /// error that aborts registry load.
    pub fn compile(&self) -> Result<SourceDefinition, SourceError> {
        let base_url =
            Url::parse(&self.base_url).map_err(|e| SourceError::InvalidUrl {
                input: self.base_url.clone(),
                reason: e.to_string(),
            })?;

        let chain = |spec: &Option<SelectorSpec>,
                     field: &str,
                     kind: FieldKind|
         -> Result<Option<SelectorChain>, SourceError> {
            match spec {
                None => Ok(None),
                Some(spec) => SelectorChain::parse(kind, &spec.expressions())
                    .map(Some)
                    .map_err(|reason| SourceError::InvalidSelectorChain {
                        id: self.id.clone(),
                        field: field.to_string(),
                        reason,
                    }),
            }
        };

        let s = &self.selectors;
        let selectors = SelectorSet {
            book_item: chain(&s.book_item, "bookItem", FieldKind::Link)?,
            book_item_title: chain(&s.book_item_title, "bookItemTitle", FieldKind::Text)?,
            book_item_url: chain(&s.book_item_url, "bookItemUrl", FieldKind::Link)?,
            book_item_cover: chain(&s.book_item_cover, "bookItemCover", FieldKind::Image)?,
            next_page: chain(&s.next_page, "nextPage", FieldKind::Link)?,
            chapter_item: chain(&s.chapter_item, "chapterItem", FieldKind::Link)?,
            chapter_title: chain(&s.chapter_title, "chapterTitle", FieldKind::Text)?,
            chapter_text: chain(&s.chapter_text, "chapterText", FieldKind::Text)?,
            book_description: chain(&s.book_description, "bookDescription", FieldKind::Text)?,
        };

        let fetch_policy = if self.fetch_policy.is_empty() {
            default_fetch_policy()
        } else {
            self.fetch_policy.clone()
        };

        Ok(SourceDefinition {
            id: self.id.clone(),
            name: self.name.clone(),
            base_url,
            catalog_url: self.catalog_url.clone(),
            search_url: self.search_url.clone(),
            language: self.language,
            fetch_policy,
            selectors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config(id: &str) -> SourceConfig {
        serde_json::from_str(&format!(
            r#"{{
                "id": "{id}",
                "name": "Test Source",
                "baseUrl": "https://example.com",
                "catalogUrl": "https://example.com/list?page={{page}}",
                "selectors": {{ "bookItem": ".item" }}
            }}"#
        ))
        .expect("valid config json")
    }

    #[test]
    fn selector_spec_accepts_single_string_and_list() -> Result<(), serde_json::Error> {
        let one: SelectorSpec = serde_json::from_str(r#""h1.title""#)?;
        assert_eq!(one.expressions(), vec!["h1.title".to_string()]);
        let many: SelectorSpec = serde_json::from_str(r#"["h1", "h2"]"#)?;
        assert_eq!(many.expressions().len(), 2);
        Ok(())
    }

    #[test]
    fn empty_chain_is_rejected() {
        let err = SelectorChain::parse(FieldKind::Text, &[]).unwrap_err();
        assert!(err.contains("empty"));
    }

    #[test]
    fn unparseable_selector_is_rejected_with_expression_in_reason() {
        let err =
            SelectorChain::parse(FieldKind::Text, &["<<not a selector".to_string()]).unwrap_err();
        assert!(err.contains("<<not a selector"));
    }

    #[test]
    fn compile_defaults_policy_to_direct_then_bypass() -> Result<(), SourceError> {
        let def = minimal_config("t").compile()?;
        assert_eq!(
            def.fetch_policy,
            vec![FetchStrategy::Direct, FetchStrategy::BypassClient]
        );
        let chain = def.selectors.book_item.as_ref().expect("bookItem configured");
        assert_eq!(chain.len(), 1);
        assert!(!chain.is_empty());
        assert_eq!(chain.kind(), FieldKind::Link);
        Ok(())
    }

    #[test]
    fn compile_rejects_invalid_base_url() {
        let mut config = minimal_config("t");
        config.base_url = "not a url".to_string();
        match config.compile() {
            Err(SourceError::InvalidUrl { input, .. }) => assert_eq!(input, "not a url"),
            other => panic!("expected InvalidUrl, got {:?}", other.map(|d| d.id)),
        }
    }

    #[test]
    fn compile_rejects_explicit_empty_chain() {
        let mut config = minimal_config("t");
        config.selectors.book_item = Some(SelectorSpec::Chain(vec![]));
        match config.compile() {
            Err(SourceError::InvalidSelectorChain { field, .. }) => {
                assert_eq!(field, "bookItem")
            }
            other => panic!("expected InvalidSelectorChain, got {:?}", other.map(|d| d.id)),
        }
    }

    #[test]
    fn fetch_policy_parses_wire_names() -> Result<(), serde_json::Error> {
        let policy: Vec<FetchStrategy> = serde_json::from_str(r#"["direct","bypass","solver"]"#)?;
        assert_eq!(
            policy,
            vec![
                FetchStrategy::Direct,
                FetchStrategy::BypassClient,
                FetchStrategy::RemoteSolver
            ]
        );
        Ok(())
    }

    #[test]
    fn language_defaults_to_english_and_exposes_code() {
        assert_eq!(Language::default(), Language::English);
        assert_eq!(Language::Indonesian.code(), "id");
    }
}
