//! Document retrieval with per-source strategy escalation. A source's fetch
//! policy is an ordered list of strategies; escalation happens only on
//! anti-bot failure signatures (HTTP 403/429 or a recognized challenge
//! page). Connection-level failures are environmental and surface
//! immediately without trying another strategy.

pub(crate) mod client;
mod solver;

pub use client::{HttpTransport, TransportSettings};
pub use solver::{SolverClient, DEFAULT_SOLVER_URL};

use reqwest::Url;
use thiserror::Error;
use tracing::{debug, warn};

use crate::extract::Document;
use crate::source::{FetchStrategy, SourceDefinition};

/// Failure classification for one retrieval attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    ConnectionRefused,
    DnsFailure,
    /// Rejected by a bot-mitigation layer (403/429 or a challenge page).
    Blocked,
    /// Any other non-success HTTP status.
    HttpError,
    Unknown,
}

/// A failed retrieval. `http_status` is present when the server answered.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub http_status: Option<u16>,
    pub url: String,
    pub message: String,
}

impl FetchError {
    pub fn timeout(url: &str) -> Self {
        Self {
            kind: FetchErrorKind::Timeout,
            http_status: None,
            url: url.to_string(),
            message: format!("Timed out fetching {}", url),
        }
    }

    pub fn connection_refused(url: &str, detail: &str) -> Self {
        Self {
            kind: FetchErrorKind::ConnectionRefused,
            http_status: None,
            url: url.to_string(),
            message: format!("Connection failed for {}: {}", url, detail),
        }
    }

    pub fn dns_failure(url: &str) -> Self {
        Self {
            kind: FetchErrorKind::DnsFailure,
            http_status: None,
            url: url.to_string(),
            message: format!("DNS lookup failed for {}", url),
        }
    }

    pub fn blocked(url: &str, status: u16) -> Self {
        Self {
            kind: FetchErrorKind::Blocked,
            http_status: Some(status),
            url: url.to_string(),
            message: format!("Blocked by anti-bot protection at {} (HTTP {})", url, status),
        }
    }

    pub fn http_status(url: &str, status: u16) -> Self {
        Self {
            kind: FetchErrorKind::HttpError,
            http_status: Some(status),
            url: url.to_string(),
            message: format!("HTTP {} when fetching {}", status, url),
        }
    }

    pub fn unknown(url: &str, detail: &str) -> Self {
        Self {
            kind: FetchErrorKind::Unknown,
            http_status: None,
            url: url.to_string(),
            message: format!("Request failed for {}: {}", url, detail),
        }
    }
}

/// A successfully retrieved page: the body, the URL it was finally served
/// from (after redirects), and the HTTP status.
#[derive(Debug, Clone)]
pub struct Page {
    pub body: String,
    pub final_url: Url,
    pub status: u16,
}

impl Page {
    /// Parse the body for extraction, carrying the final URL so relative
    /// links resolve correctly.
    pub fn document(&self) -> Document {
        Document::parse(&self.body, self.final_url.clone())
    }
}

/// Every retrieval attempt ends in exactly one of these.
pub type FetchOutcome = Result<Page, FetchError>;

/// One GET through one strategy. Implemented by the real HTTP transport and
/// by test stand-ins.
pub trait Transport {
    fn get(&mut self, strategy: FetchStrategy, url: &str) -> FetchOutcome;
}

/// Fetches a URL for a source by walking its fetch policy.
pub struct Fetcher<T = HttpTransport> {
    transport: T,
}

impl Fetcher<HttpTransport> {
    pub fn new(settings: TransportSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            transport: HttpTransport::new(settings)?,
        })
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// Try the source's strategies in policy order. A success returns
    /// immediately. A `Blocked` failure escalates to the next strategy;
    /// every other failure is surfaced as-is, and an exhausted policy
    /// returns the last error encountered.
    pub fn fetch(&mut self, source: &SourceDefinition, url: &str) -> FetchOutcome {
        let mut last_error: Option<FetchError> = None;
        for strategy in &source.fetch_policy {
            debug!(source = %source.id, %strategy, url, "fetch attempt");
            match self.transport.get(*strategy, url) {
                Ok(page) => return Ok(page),
                Err(e) if e.kind == FetchErrorKind::Blocked => {
                    warn!(source = %source.id, %strategy, url, status = ?e.http_status,
                          "blocked, escalating to next strategy");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| FetchError::unknown(url, "fetch policy declared no strategies")))
    }
}

/// Seam between the catalog builder and the fetch layer: retrieve one URL on
/// behalf of one source.
pub trait SourceFetcher {
    fn fetch(&mut self, source: &SourceDefinition, url: &str) -> FetchOutcome;
}

impl<T: Transport> SourceFetcher for Fetcher<T> {
    fn fetch(&mut self, source: &SourceDefinition, url: &str) -> FetchOutcome {
        Fetcher::fetch(self, source, url)
    }
}
