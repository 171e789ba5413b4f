//! CLI module for statuspage-exporter
//!
//! Provides the command-line interface for running the exporter.

pub mod once;
pub mod serve;

use clap::{Parser, Subcommand};

/// Status page poller - exports third-party service status as Prometheus metrics
#[derive(Parser, Debug)]
#[command(name = "statuspage-exporter")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    STATUSPAGE_SERVICES_FILE        Services file (default: services.json)
    STATUSPAGE_POLL_INTERVAL_SECS   Poll interval in seconds (default: 1200)
    STATUSPAGE_FETCH_TIMEOUT_SECS   Per-service timeout in seconds (default: 15)
    STATUSPAGE_MAX_CONCURRENCY      Concurrent fetches (default: 8)
    STATUSPAGE_METRICS_HOST         Bind address (default: 0.0.0.0)
    STATUSPAGE_METRICS_PORT         Listen port (default: 9001)
    STATUSPAGE_CACHE_DIR            Snapshot cache directory (default: cache)
    STATUSPAGE_PURGE_CACHE          Purge the cache on start (1/true/yes/on)
    STATUSPAGE_DEBUG                Force debug logging
    STATUSPAGE_LOG_LEVEL            Log filter (default: info)
    STATUSPAGE_LOG_DIR              Daily log file directory
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll on a schedule and serve /metrics
    Serve(serve::ServeArgs),
    /// Run a single round and print the exposition text
    Once(once::OnceArgs),
}
