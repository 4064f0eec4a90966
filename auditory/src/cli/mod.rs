//! CLI module for auditory
//!
//! Provides the command-line interface for the audit proxy.

pub mod serve;

use clap::{Parser, Subcommand};

/// Auditory - capture, correlate and archive HTTP audit records
#[derive(Parser, Debug)]
#[command(name = "auditory")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    AUDITORY_CONTROL_ADDR          Control plane bind address (default: 0.0.0.0:8080)
    AUDITORY_PROXY_ADDR            Proxy bind address (default: 0.0.0.0:8081)
    AUDITORY_TARGET_URL            Proxy target (proxy disabled if unset)
    AUDITORY_DATA_DIR              Local audit log directory (default: tmp)
    AUDITORY_IDEMPOTENCY_TTL       Idempotency window TTL (default: 1m)
    AUDITORY_REDACT                Header/query names to mask (comma separated)
    AUDITORY_PENDING_TTL           Drop unanswered requests after (default: 5m, 0 disables)
    AUDITORY_BUCKET_ENDPOINT       Object store endpoint (filesystem store if unset)
    AUDITORY_BUCKET_NAME           Object store bucket (default: auditory-bucket)
    AUDITORY_COLD_DIR              Filesystem cold store root (default: cold)
    AUDITORY_COMPACTION_TRIGGER    daily | exact (default: daily)
    AUDITORY_LOG_LEVEL             Log level (default: info)
    AUDITORY_LOG_FORMAT            text | json (default: text)
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the control plane, proxy and background jobs
    Serve(serve::ServeArgs),
}
