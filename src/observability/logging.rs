//! Structured logging configuration.

use crate::config::LoggingSettings;
use crate::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";
const VERBOSE_LEVEL: &str = "debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Single-line `key=value` output.
    #[default]
    Compact,
    /// Multi-line human-readable output.
    Pretty,
    /// Newline-delimited JSON.
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "compact" | "logfmt" | "text" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!("unknown log format '{other}'"))),
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub directive: String,
    /// Output format.
    pub format: LogFormat,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directive: DEFAULT_LEVEL.to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Resolves settings; `verbose` forces debug level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown format.
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Result<Self> {
        let format = settings
            .and_then(|s| s.format.as_deref())
            .map(LogFormat::from_str)
            .transpose()?
            .unwrap_or_default();

        let directive = if verbose {
            VERBOSE_LEVEL.to_string()
        } else {
            settings
                .and_then(|s| s.level.clone())
                .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
        };

        Ok(Self {
            directive,
            format,
            file: settings.and_then(|s| s.file.clone()),
        })
    }

    /// Builds the filter. `RUST_LOG` wins over the configured directive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configured directive is invalid.
    pub fn filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.directive).map_err(|e| {
            Error::InvalidInput(format!("invalid log filter '{}': {e}", self.directive))
        })
    }
}
