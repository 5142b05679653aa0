//! Optional config file loading. Search order: ./novelsource.toml, then
//! $XDG_CONFIG_HOME/novelsource/config.toml (or ~/.config/novelsource/config.toml).

use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Path to a sources JSON file. When unset, the built-in source set is used.
    pub sources_path: Option<PathBuf>,
    /// HTTP User-Agent for the direct strategy.
    pub user_agent: Option<String>,
    /// Minimum delay in seconds between outbound requests.
    pub request_delay_secs: Option<u64>,
    /// Request timeout in seconds for the direct and bypass strategies.
    pub timeout_secs: Option<u64>,
    /// Endpoint of the local challenge-solver service.
    pub solver_url: Option<String>,
    /// Budget in seconds granted to the solver per request.
    pub solver_timeout_secs: Option<u64>,
    /// Worker count for the audit command.
    pub audit_concurrency: Option<usize>,
    /// Delay in seconds between audit requests to the same host.
    pub audit_delay_secs: Option<u64>,
}

/// Search order: (1) ./novelsource.toml, (2) $XDG_CONFIG_HOME/novelsource/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("novelsource.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("novelsource").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.sources_path.is_none());
        assert!(c.user_agent.is_none());
        assert!(c.request_delay_secs.is_none());
        assert!(c.timeout_secs.is_none());
        assert!(c.solver_url.is_none());
        assert!(c.solver_timeout_secs.is_none());
        assert!(c.audit_concurrency.is_none());
        assert!(c.audit_delay_secs.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            sources_path = "sources.json"
            user_agent = "Custom/1.0"
            request_delay_secs = 3
            timeout_secs = 60
            solver_url = "http://localhost:8191/v1"
            solver_timeout_secs = 90
            audit_concurrency = 8
            audit_delay_secs = 2
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(
            c.sources_path.as_deref(),
            Some(std::path::Path::new("sources.json"))
        );
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.request_delay_secs, Some(3));
        assert_eq!(c.timeout_secs, Some(60));
        assert_eq!(c.solver_url.as_deref(), Some("http://localhost:8191/v1"));
        assert_eq!(c.solver_timeout_secs, Some(90));
        assert_eq!(c.audit_concurrency, Some(8));
        assert_eq!(c.audit_delay_secs, Some(2));
    }

    #[test]
    fn parse_partial_config() {
        let s = r#"
            request_delay_secs = 1
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert!(c.sources_path.is_none());
        assert_eq!(c.request_delay_secs, Some(1));
        assert!(c.solver_url.is_none());
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("sources_path = [").is_err());
    }
}
