//! # Observability
//!
//! Logging setup for the Plausible courier.
//!
//! Components only use `tracing` macros. Binaries call
//! [`init`] or [`init_with_config`] once at startup to decide where logs go:
//!
//! - a JSONL file (one object per line, safe to `tail -f | jq`)
//! - a compact human-readable stream on stderr
//!
//! `RUST_LOG` overrides the configured default level.
//!
//! ```rust,ignore
//! fn main() -> anyhow::Result<()> {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "plausible".into(),
//!         default_level: "debug".into(),
//!         log_path: Some(paths.log_file()),
//!         also_stderr: true,
//!     })?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

mod json_layer;
mod writer;

use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::AppendMakeWriter;

/// Errors raised while installing the subscriber.
#[derive(Error, Debug)]
pub enum ObservabilityError {
    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid log filter {0:?}")]
    Filter(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written into every JSONL entry.
    pub service_name: String,

    /// Default filter directive (e.g. "info", "plausible_courier=debug").
    /// `RUST_LOG` takes precedence when set.
    pub default_level: String,

    /// JSONL log file. `None` disables the file layer.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// `~/.plausible/logs/<service>.jsonl`, if a home directory exists.
pub fn default_log_path(service_name: &str) -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join(".plausible")
            .join("logs")
            .join(format!("{service_name}.jsonl"))
    })
}

/// Initialize logging to the default log file and stderr.
pub fn init(service_name: &str) -> Result<(), ObservabilityError> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        log_path: default_log_path(service_name),
        ..Default::default()
    })
}

/// Initialize logging with custom configuration.
///
/// Returns an error instead of panicking when the log file cannot be opened
/// or a global subscriber is already installed.
pub fn init_with_config(config: LogConfig) -> Result<(), ObservabilityError> {
    let file_layer = match &config.log_path {
        Some(path) => {
            let writer =
                AppendMakeWriter::open(path).map_err(|source| ObservabilityError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            let filter = build_filter(&config.default_level)?;
            Some(JsonLayer::new(config.service_name.clone(), writer).with_filter(filter))
        }
        None => None,
    };

    let stderr_layer = if config.also_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .compact()
                .with_writer(std::io::stderr)
                .with_filter(build_filter(&config.default_level)?),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| ObservabilityError::AlreadyInitialized(e.to_string()))?;

    if let Some(path) = &config.log_path {
        tracing::debug!(log_path = %path.display(), "observability initialized");
    }
    Ok(())
}

fn build_filter(default_level: &str) -> Result<EnvFilter, ObservabilityError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|_| ObservabilityError::Filter(default_level.to_string())),
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};
