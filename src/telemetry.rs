//! Relay logging setup
//!
//! Installs the global `tracing` subscriber used by the relay binary. Output
//! goes to stdout, to a single non-rotating file, or nowhere; the format is
//! human-readable text or JSON lines.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ollama_relay::telemetry::{LogConfig, LogFormat, LogTarget};
//!
//! let config = LogConfig {
//!     level: tracing::Level::DEBUG,
//!     format: LogFormat::Json,
//!     target: LogTarget::Stdout,
//! };
//! let _guard = ollama_relay::telemetry::init(config)?;
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;

use crate::error::{RelayError, Result};

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, fields nested under `fields`.
    Json,
    /// One JSON object per event, fields at the top level.
    JsonFlat,
}

impl FromStr for LogFormat {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "json-flat" | "json-compact" => Ok(Self::JsonFlat),
            other => Err(RelayError::Config(format!(
                "Unknown log format '{other}' (expected text, json or json-flat)"
            ))),
        }
    }
}

/// Where log lines are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogTarget {
    #[default]
    Stdout,
    File(PathBuf),
    Discard,
}

impl LogTarget {
    fn writer(&self) -> Result<(NonBlocking, WorkerGuard)> {
        Ok(match self {
            Self::Stdout => tracing_appender::non_blocking(std::io::stdout()),
            Self::Discard => tracing_appender::non_blocking(std::io::sink()),
            Self::File(path) => {
                let file_name = path
                    .file_name()
                    .ok_or_else(|| RelayError::Config(format!("Invalid log file: {path:?}")))?;
                let dir = match path.parent() {
                    Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                    _ => PathBuf::from("."),
                };
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
            }
        })
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: tracing::Level,
    pub format: LogFormat,
    pub target: LogTarget,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            format: LogFormat::Text,
            target: LogTarget::Stdout,
        }
    }
}

impl LogConfig {
    /// Read `RELAY_LOG_LEVEL`, `RELAY_LOG_FORMAT` and `RELAY_LOG_FILE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(level) = lookup("RELAY_LOG_LEVEL") {
            config.level = tracing::Level::from_str(level.trim())
                .map_err(|_| RelayError::Config(format!("Unknown log level '{level}'")))?;
        }
        if let Some(format) = lookup("RELAY_LOG_FORMAT") {
            config.format = format.parse()?;
        }
        if let Some(path) = lookup("RELAY_LOG_FILE").filter(|p| !p.trim().is_empty()) {
            config.target = LogTarget::File(PathBuf::from(path));
        }
        Ok(config)
    }

    /// Relay and HTTP layer events at the configured level.
    fn directive(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        format!("ollama_relay={level},tower_http={level}")
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level when set. The returned guard
/// flushes buffered lines on drop and must outlive the program's logging.
/// A second call leaves the first subscriber in place and returns `None`.
pub fn init(config: LogConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()));
    let (writer, guard) = config.target.writer()?;
    let ansi = config.target == LogTarget::Stdout;

    let fmt = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);
    let installed = match config.format {
        LogFormat::Text => fmt.with_ansi(ansi).try_init(),
        LogFormat::Json => fmt.json().try_init(),
        LogFormat::JsonFlat => fmt.json().flatten_event(true).try_init(),
    };

    match installed {
        Ok(()) => Ok(Some(guard)),
        Err(e) if e.to_string().contains("already been set") => Ok(None),
        Err(e) => Err(RelayError::Config(format!("Failed to install log subscriber: {e}"))),
    }
}

/// [`init`] with settings from the environment.
pub fn init_from_env() -> Result<Option<WorkerGuard>> {
    init(LogConfig::from_env()?)
}
