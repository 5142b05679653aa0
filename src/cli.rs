//! CLI parsing and orchestration. Parses args, loads the registry, runs one
//! operation, prints text or JSON. Maps errors to exit codes.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::audit::{audit_all, AuditOptions, HealthStatus, SourceHealth};
use crate::catalog::SourceClient;
use crate::config;
use crate::error::SourceError;
use crate::extract::ExtractedField;
use crate::fetch::Fetcher;
use crate::fetch::TransportSettings;
use crate::model::{BookSummary, PagedResult};
use crate::source::Registry;

const DEFAULT_DELAY_SECS: u64 = 2;
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_SOLVER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_AUDIT_CONCURRENCY: usize = 4;
const DEFAULT_AUDIT_DELAY_SECS: u64 = 1;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Source(#[from] SourceError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Source(_) => 2,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "novelsource")]
#[command(about = "Browse, search, and audit configured web-novel sources")]
#[command(
    after_help = "Config file keys (sources_path, user_agent, request_delay_secs, timeout_secs, solver_url, solver_timeout_secs, audit_concurrency, audit_delay_secs) are read from novelsource.toml. CLI flags override config."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a sources JSON file. Default: the built-in source set.
    #[arg(long, global = true)]
    pub sources: Option<PathBuf>,

    /// HTTP User-Agent for the direct strategy (overrides config).
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 2).
    #[arg(long, global = true)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 20).
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Challenge-solver endpoint (overrides config; default localhost).
    #[arg(long, global = true)]
    pub solver_url: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress progress and summary output (results and errors only).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print verbose error chain.
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered sources.
    Sources,

    /// List one page of a source's catalog.
    Catalog {
        /// Source id (see the sources command).
        source: String,
        /// 0-based page index.
        #[arg(long, default_value_t = 0)]
        page: u32,
    },

    /// Search a source for books matching a query.
    Search {
        source: String,
        query: String,
        #[arg(long, default_value_t = 0)]
        page: u32,
    },

    /// List all chapters of a book.
    Chapters { source: String, book_url: String },

    /// Show a book's description.
    Book { source: String, book_url: String },

    /// Fetch one chapter's title and text.
    Chapter { source: String, chapter_url: String },

    /// Probe the health of every registered source.
    Audit {
        /// Worker count (overrides config; default 4).
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

fn load_registry(args: &Args, config: Option<&config::Config>) -> Result<Registry, CliRunError> {
    let path = args
        .sources
        .clone()
        .or_else(|| config.and_then(|c| c.sources_path.clone()));
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(&path).map_err(|e| {
                CliRunError::InvalidInput(format!(
                    "Cannot read sources file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Ok(Registry::from_json(&json)?)
        }
        None => Ok(Registry::builtin()?),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliRunError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to encode JSON: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn print_book_page(args: &Args, page: &PagedResult<BookSummary>) -> Result<(), CliRunError> {
    if args.json {
        return print_json(page);
    }
    for (i, book) in page.items.iter().enumerate() {
        let title = if book.title.is_empty() {
            "(untitled)"
        } else {
            &book.title
        };
        println!("{:2}. {}", i + 1, title);
        println!("    {}", book.url);
        if let Some(cover) = &book.cover_url {
            println!("    cover: {}", cover);
        }
    }
    if !args.quiet {
        let last = if page.is_last_page { ", last page" } else { "" };
        eprintln!(
            "Page {}: {} item(s){}",
            page.page_index,
            page.items.len(),
            last
        );
    }
    Ok(())
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let registry = load_registry(args, config.as_ref())?;

    let delay_secs = args
        .delay
        .or_else(|| config.as_ref().and_then(|c| c.request_delay_secs))
        .unwrap_or(DEFAULT_DELAY_SECS);
    let timeout_secs = args
        .timeout
        .or_else(|| config.as_ref().and_then(|c| c.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let solver_timeout_secs = config
        .as_ref()
        .and_then(|c| c.solver_timeout_secs)
        .unwrap_or(DEFAULT_SOLVER_TIMEOUT_SECS);
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.user_agent.clone()));
    let solver_url = args
        .solver_url
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.solver_url.clone()));

    if let Command::Sources = args.command {
        if args.json {
            let rows: Vec<serde_json::Value> = registry
                .all()
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "id": &s.id,
                        "name": &s.name,
                        "baseUrl": s.base_url.as_str(),
                        "language": s.language.code(),
                        "fetchPolicy": &s.fetch_policy,
                    })
                })
                .collect();
            return print_json(&rows);
        }
        for source in registry.all() {
            let policy: Vec<String> = source.fetch_policy.iter().map(|s| s.to_string()).collect();
            println!(
                "{:<16} {:<20} {} [{}] ({})",
                source.id,
                source.name,
                source.base_url,
                source.language.code(),
                policy.join(" > ")
            );
        }
        return Ok(());
    }

    if let Command::Audit { concurrency } = &args.command {
        let options = AuditOptions {
            concurrency: (*concurrency)
                .or_else(|| config.as_ref().and_then(|c| c.audit_concurrency))
                .unwrap_or(DEFAULT_AUDIT_CONCURRENCY),
            request_delay: Duration::from_secs(
                config
                    .as_ref()
                    .and_then(|c| c.audit_delay_secs)
                    .unwrap_or(DEFAULT_AUDIT_DELAY_SECS),
            ),
            timeout_secs,
            user_agent,
            solver_url,
            solver_timeout_secs,
        };
        return run_audit(args, &registry, &options);
    }

    let settings = TransportSettings {
        user_agent,
        timeout_secs,
        delay_secs,
        solver_url,
        solver_timeout_secs,
    };
    let mut fetcher = Fetcher::new(settings)
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;
    let mut client = SourceClient::new(&registry, &mut fetcher);

    match &args.command {
        Command::Catalog { source, page } => {
            let result = client.list_catalog(source, *page)?;
            print_book_page(args, &result)?;
        }
        Command::Search {
            source,
            query,
            page,
        } => {
            let result = client.search(source, *page, query)?;
            print_book_page(args, &result)?;
        }
        Command::Chapters { source, book_url } => {
            let chapters = client.list_chapters(source, book_url)?;
            if args.json {
                print_json(&chapters)?;
            } else {
                for (i, chapter) in chapters.iter().enumerate() {
                    println!("{:4}. {}", i + 1, chapter.title);
                    println!("      {}", chapter.url);
                }
                if !args.quiet {
                    eprintln!("{} chapter(s)", chapters.len());
                }
            }
        }
        Command::Book { source, book_url } => {
            let description = client.book_description(source, book_url)?;
            if args.json {
                print_json(&description.clone().into_option())?;
            } else {
                match description {
                    ExtractedField::Found(text) => println!("{}", text),
                    ExtractedField::NotFound => println!("(no description found)"),
                }
            }
        }
        Command::Chapter {
            source,
            chapter_url,
        } => {
            let chapter = client.chapter(source, chapter_url)?;
            if args.json {
                print_json(&chapter)?;
            } else {
                if let Some(title) = &chapter.title {
                    println!("{}", title);
                    println!();
                }
                match &chapter.text {
                    Some(text) => println!("{}", text),
                    None => println!("(no chapter text found)"),
                }
            }
        }
        Command::Sources | Command::Audit { .. } => unreachable!("handled above"),
    }
    Ok(())
}

fn run_audit(
    args: &Args,
    registry: &Registry,
    options: &AuditOptions,
) -> Result<(), CliRunError> {
    let bar = if args.quiet {
        None
    } else {
        let bar = indicatif::ProgressBar::new(registry.len() as u64);
        bar.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    };

    let progress_cb = |health: &SourceHealth| {
        if let Some(bar) = &bar {
            bar.set_message(format!("{}: {}", health.source_id, health.status));
            bar.inc(1);
        }
    };
    let progress: Option<&(dyn Fn(&SourceHealth) + Sync)> = Some(&progress_cb);

    let report = audit_all(registry, options, progress)
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    if let Some(bar) = &bar {
        bar.disable_steady_tick();
        bar.finish_and_clear();
    }

    if args.json {
        return print_json(&report);
    }

    for health in report.values() {
        let standard = health
            .standard_http_status
            .map_or("-".to_string(), |s| s.to_string());
        let bypass = health
            .bypass_http_status
            .map_or("-".to_string(), |s| s.to_string());
        println!(
            "{:<16} {:<13} dns={} http={} bypass={}",
            health.source_id,
            health.status.to_string(),
            if health.dns_ok { "ok" } else { "fail" },
            standard,
            bypass
        );
    }
    if !args.quiet {
        let count = |status: HealthStatus| {
            report.values().filter(|h| h.status == status).count()
        };
        eprintln!(
            "{} source(s): {} alive, {} protected, {} dead, {} discontinued, {} uncertain",
            report.len(),
            count(HealthStatus::Alive),
            count(HealthStatus::Protected),
            count(HealthStatus::Dead),
            count(HealthStatus::Discontinued),
            count(HealthStatus::Uncertain)
        );
    }
    Ok(())
}
