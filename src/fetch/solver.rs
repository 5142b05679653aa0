//! Client for the external challenge-solver service on local loopback. The
//! solver performs a full browser-like fetch on our behalf; it is the policy
//! of last resort because each solve takes seconds. An unreachable solver is
//! a `ConnectionRefused` outcome for this request, never evidence that the
//! target site itself is down.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fetch::client::classify_request_error;
use crate::fetch::{FetchError, FetchErrorKind, FetchOutcome, Page};

/// Default endpoint of a locally running solver service.
pub const DEFAULT_SOLVER_URL: &str = "http://localhost:8191/v1";

/// Extra margin on the HTTP timeout so the solver's own budget expires first.
const HTTP_TIMEOUT_MARGIN_SECS: u64 = 10;

#[derive(Debug, Serialize)]
struct SolverRequest<'a> {
    cmd: &'static str,
    url: &'a str,
    #[serde(rename = "maxTimeout")]
    max_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    status: String,
    #[serde(default)]
    message: String,
    solution: Option<Solution>,
}

#[derive(Debug, Deserialize)]
struct Solution {
    url: String,
    status: u16,
    response: String,
}

/// Blocking client for the solver's JSON-over-HTTP protocol.
pub struct SolverClient {
    http: Client,
    endpoint: String,
    max_timeout_ms: u64,
}

impl SolverClient {
    pub fn new(endpoint: Option<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs + HTTP_TIMEOUT_MARGIN_SECS))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_SOLVER_URL.to_string()),
            max_timeout_ms: timeout_secs * 1000,
        })
    }

    /// Ask the solver to fetch `url` and return the solved page.
    pub fn get(&self, url: &str) -> FetchOutcome {
        let payload = SolverRequest {
            cmd: "request.get",
            url,
            max_timeout: self.max_timeout_ms,
        };
        debug!(url, endpoint = %self.endpoint, "delegating fetch to solver");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .map_err(|e| solver_transport_error(url, &e))?;
        let parsed: SolverResponse = response
            .json()
            .map_err(|e| FetchError::unknown(url, &format!("unreadable solver response: {}", e)))?;
        interpret_solver_response(url, parsed)
    }
}

/// A failure talking to the solver itself. Reuses the transport
/// classification but pins the message on the solver, since a refused
/// loopback connection means the service is absent.
fn solver_transport_error(url: &str, e: &reqwest::Error) -> FetchError {
    let classified = classify_request_error(url, e);
    if classified.kind == FetchErrorKind::ConnectionRefused {
        FetchError::connection_refused(url, "solver service is not reachable")
    } else {
        classified
    }
}

fn interpret_solver_response(url: &str, parsed: SolverResponse) -> FetchOutcome {
    if parsed.status != "ok" {
        let detail = if parsed.message.is_empty() {
            format!("solver reported status '{}'", parsed.status)
        } else {
            parsed.message
        };
        return Err(FetchError::unknown(url, &detail));
    }
    let Some(solution) = parsed.solution else {
        return Err(FetchError::unknown(url, "solver returned no solution"));
    };
    let code = solution.status;
    if (200..300).contains(&code) {
        let final_url = Url::parse(&solution.url)
            .or_else(|_| Url::parse(url))
            .map_err(|e| FetchError::unknown(url, &format!("invalid URL: {}", e)))?;
        return Ok(Page {
            body: solution.response,
            final_url,
            status: code,
        });
    }
    if code == 403 || code == 429 {
        return Err(FetchError::blocked(url, code));
    }
    Err(FetchError::http_status(url, code))
}
