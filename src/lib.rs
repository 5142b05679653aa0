//! novelsource: configuration-driven scraping engine for web-novel sources.
//!
//! One generic engine interprets immutable per-site definitions: ordered
//! fallback selector chains for extraction, and an ordered fetch policy that
//! escalates from a plain client through an anti-bot bypass client to an
//! external challenge solver. A concurrent auditor classifies the health of
//! every registered source from raw DNS and HTTP signals.

pub mod audit;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod source;

// Re-exports for consumers.
pub use audit::{audit_all, AuditOptions, HealthStatus, SourceHealth};
pub use catalog::SourceClient;
pub use error::{Outcome, SourceError};
pub use extract::{Document, ExtractedField};
pub use fetch::{
    FetchError, FetchErrorKind, FetchOutcome, Fetcher, Page, SolverClient, SourceFetcher,
    Transport, TransportSettings,
};
pub use model::{BookSummary, ChapterContent, ChapterSummary, PagedResult};
pub use source::{
    FetchStrategy, Language, Registry, SelectorChain, SourceConfig, SourceDefinition,
};
