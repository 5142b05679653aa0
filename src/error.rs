//! Result envelope and error taxonomy for the source engine.
//!
//! Every fallible operation on the public surface returns [`Outcome`], a
//! `Result` over [`SourceError`]. Configuration problems (duplicate ids,
//! invalid selector chains, unparsable sources JSON, invalid URLs) and
//! per-request lookup failures are values, never panics; transport failures
//! are wrapped from [`FetchError`].

use thiserror::Error;

use crate::fetch::FetchError;

/// Result alias for source-engine operations.
pub type Outcome<T> = Result<T, SourceError>;

/// Errors surfaced by the configuration-driven source engine.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A base or request URL in a source definition could not be parsed.
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    /// A selector chain for `field` on source `id` failed to compile.
    #[error("Invalid selector chain for '{field}' on source '{id}': {reason}")]
    InvalidSelectorChain {
        id: String,
        field: String,
        reason: String,
    },

    /// Two source definitions share the same id.
    #[error("Duplicate source id: {id}")]
    DuplicateSourceId { id: String },

    /// No registered source matches the requested id.
    #[error("Unknown source id: {id}")]
    UnknownSourceId { id: String },

    /// A search was requested for a source with no configured search URL.
    #[error("Source '{id}' does not support search")]
    SearchNotConfigured { id: String },

    /// The sources JSON could not be parsed into source definitions.
    #[error("Invalid sources configuration: {reason}")]
    InvalidSources { reason: String },

    /// A fetch failed after the policy exhausted its strategies.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
