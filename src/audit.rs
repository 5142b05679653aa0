//! Concurrent source health auditing. Each worker probes one source end to
//! end (DNS, plain GET, bypass GET) with an enforced delay between requests
//! to the same host, and the classification is a pure function of the three
//! signals. Every audit pass produces fresh records; nothing is carried
//! between runs.

use std::collections::BTreeMap;
use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fetch::client::{bypass_client, direct_client, http_get};
use crate::fetch::{FetchErrorKind, FetchOutcome, SolverClient, TransportSettings};
use crate::source::{FetchStrategy, Registry, SourceDefinition};

/// Health classification of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The bypass path reached real content.
    Alive,
    /// Reachable but behind bot mitigation the bypass client cannot clear.
    Protected,
    /// The domain no longer resolves.
    Dead,
    /// The site answered 410: intentionally gone.
    Discontinued,
    /// Signals did not match any known pattern.
    Uncertain,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HealthStatus::Alive => "alive",
            HealthStatus::Protected => "protected",
            HealthStatus::Dead => "dead",
            HealthStatus::Discontinued => "discontinued",
            HealthStatus::Uncertain => "uncertain",
        };
        f.write_str(name)
    }
}

/// Result of probing one source. Recomputed wholly on each audit pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub source_id: String,
    pub status: HealthStatus,
    pub dns_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypass_http_status: Option<u16>,
    pub checked_at: DateTime<Utc>,
}

/// Tuning for an audit pass.
#[derive(Debug, Clone)]
pub struct AuditOptions {
    /// Worker count; each worker probes one source at a time.
    pub concurrency: usize,
    /// Minimum delay between requests to the same host during a probe.
    pub request_delay: Duration,
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
    pub solver_url: Option<String>,
    pub solver_timeout_secs: u64,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            request_delay: Duration::from_secs(1),
            timeout_secs: 10,
            user_agent: None,
            solver_url: None,
            solver_timeout_secs: 60,
        }
    }
}

/// Classify from the raw signals. Pure: no history, no smoothing.
pub fn classify(
    dns_ok: bool,
    _standard_status: Option<u16>,
    bypass_status: Option<u16>,
) -> HealthStatus {
    if !dns_ok {
        return HealthStatus::Dead;
    }
    match bypass_status {
        Some(200) => HealthStatus::Alive,
        Some(403) => HealthStatus::Protected,
        Some(410) => HealthStatus::Discontinued,
        _ => HealthStatus::Uncertain,
    }
}

struct ProbeClients {
    direct: Client,
    bypass: Client,
    solver: SolverClient,
}

fn probe_clients(options: &AuditOptions) -> Result<ProbeClients, reqwest::Error> {
    let settings = TransportSettings {
        user_agent: options.user_agent.clone(),
        timeout_secs: options.timeout_secs,
        delay_secs: 0,
        solver_url: options.solver_url.clone(),
        solver_timeout_secs: options.solver_timeout_secs,
    };
    Ok(ProbeClients {
        direct: direct_client(&settings)?,
        bypass: bypass_client(options.timeout_secs)?,
        solver: SolverClient::new(options.solver_url.clone(), options.solver_timeout_secs)?,
    })
}

/// The status a probe actually observed. A challenge interstitial served
/// with 200 is recorded as 403: the probe saw a block, not content.
fn observed_status(outcome: &FetchOutcome) -> Option<u16> {
    match outcome {
        Ok(page) => Some(page.status),
        Err(e) if e.kind == FetchErrorKind::Blocked && e.http_status == Some(200) => Some(403),
        Err(e) => e.http_status,
    }
}

fn dns_resolves(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    (host, 443u16)
        .to_socket_addrs()
        .map(|mut addrs| addrs.next().is_some())
        .unwrap_or(false)
}

fn probe_source(
    source: &SourceDefinition,
    clients: &ProbeClients,
    options: &AuditOptions,
) -> SourceHealth {
    let url = source.base_url.as_str();
    let dns_ok = dns_resolves(source.host());
    if !dns_ok {
        debug!(source = %source.id, "dns failed, skipping http probes");
        return SourceHealth {
            source_id: source.id.clone(),
            status: HealthStatus::Dead,
            dns_ok: false,
            standard_http_status: None,
            bypass_http_status: None,
            checked_at: Utc::now(),
        };
    }

    // Raw signal first: no strategy escalation, the audit wants to see what
    // a plain client sees.
    let standard_http_status = observed_status(&http_get(&clients.direct, url));
    std::thread::sleep(options.request_delay);

    let mut bypass_http_status = observed_status(&http_get(&clients.bypass, url));
    if bypass_http_status != Some(200)
        && source.fetch_policy.contains(&FetchStrategy::RemoteSolver)
    {
        // The source declares the solver; see whether it would get through.
        std::thread::sleep(options.request_delay);
        if let Some(status) = observed_status(&clients.solver.get(url)) {
            bypass_http_status = Some(status);
        }
    }

    let status = classify(dns_ok, standard_http_status, bypass_http_status);
    debug!(source = %source.id, %status, ?standard_http_status, ?bypass_http_status, "probed");
    SourceHealth {
        source_id: source.id.clone(),
        status,
        dns_ok,
        standard_http_status,
        bypass_http_status,
        checked_at: Utc::now(),
    }
}

/// Probe every registered source with bounded concurrency and return the
/// fresh health records keyed by source id. `progress` is invoked as each
/// source completes.
pub fn audit_all(
    registry: &Registry,
    options: &AuditOptions,
    progress: Option<&(dyn Fn(&SourceHealth) + Sync)>,
) -> Result<BTreeMap<String, SourceHealth>, reqwest::Error> {
    let sources = registry.all();
    let worker_count = options.concurrency.max(1).min(sources.len().max(1));
    let mut client_sets = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        client_sets.push(probe_clients(options)?);
    }

    let next = AtomicUsize::new(0);
    let results: Mutex<BTreeMap<String, SourceHealth>> = Mutex::new(BTreeMap::new());

    std::thread::scope(|scope| {
        for clients in &client_sets {
            let next = &next;
            let results = &results;
            scope.spawn(move || loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(source) = sources.get(index) else {
                    break;
                };
                let health = probe_source(source, clients, options);
                if let Some(callback) = progress {
                    callback(&health);
                }
                if let Ok(mut map) = results.lock() {
                    map.insert(health.source_id.clone(), health);
                }
            });
        }
    });

    Ok(results.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_covers_all_signal_branches() {
        // (dnsOk, std, bypass) -> status, one row per branch.
        let table: &[(bool, Option<u16>, Option<u16>, HealthStatus)] = &[
            (true, Some(403), Some(200), HealthStatus::Alive),
            (true, Some(403), Some(403), HealthStatus::Protected),
            (true, Some(410), Some(410), HealthStatus::Discontinued),
            (false, None, None, HealthStatus::Dead),
            (true, Some(200), Some(500), HealthStatus::Uncertain),
        ];
        for &(dns_ok, std_status, bypass, expected) in table {
            assert_eq!(classify(dns_ok, std_status, bypass), expected);
        }
    }

    #[test]
    fn dns_failure_wins_over_any_http_signal() {
        assert_eq!(classify(false, Some(200), Some(200)), HealthStatus::Dead);
    }

    #[test]
    fn missing_bypass_signal_is_uncertain() {
        assert_eq!(classify(true, Some(200), None), HealthStatus::Uncertain);
    }

    #[test]
    fn challenge_interstitial_counts_as_blocked_not_alive() {
        use crate::fetch::FetchError;
        let outcome: FetchOutcome = Err(FetchError::blocked("https://x.test/", 200));
        assert_eq!(observed_status(&outcome), Some(403));
        let hard: FetchOutcome = Err(FetchError::blocked("https://x.test/", 429));
        assert_eq!(observed_status(&hard), Some(429));
    }

    #[test]
    fn connection_failures_record_no_status() {
        use crate::fetch::FetchError;
        let outcome: FetchOutcome = Err(FetchError::timeout("https://x.test/"));
        assert_eq!(observed_status(&outcome), None);
    }

    #[test]
    fn health_record_serializes_camel_case() -> Result<(), serde_json::Error> {
        let health = SourceHealth {
            source_id: "novelfull".to_string(),
            status: HealthStatus::Protected,
            dns_ok: true,
            standard_http_status: Some(403),
            bypass_http_status: Some(403),
            checked_at: Utc::now(),
        };
        let json = serde_json::to_value(&health)?;
        assert_eq!(json["sourceId"], "novelfull");
        assert_eq!(json["status"], "protected");
        assert_eq!(json["dnsOk"], true);
        assert_eq!(json["standardHttpStatus"], 403);
        assert!(json["checkedAt"].is_string());
        Ok(())
    }

    #[test]
    fn audit_of_empty_registry_is_empty() -> Result<(), Box<dyn std::error::Error>> {
        let registry = Registry::load(&[])?;
        let report = audit_all(&registry, &AuditOptions::default(), None)?;
        assert!(report.is_empty());
        Ok(())
    }
}
