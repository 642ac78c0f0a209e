//! Configuration management.
//!
//! Values are layered: defaults, then a TOML file, then `RSSD_*`
//! environment variables, then CLI flags (applied by the binary).

mod storage;

pub use storage::{JournalMode, StorageConfig, SynchronousMode};

use crate::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default database file, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = "rss.sqlite3";

/// Default HTTP listening address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Default grace period for in-flight requests on shutdown.
pub const DEFAULT_HTTP_GRACE: Duration = Duration::from_secs(10);

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "RSSD_CONFIG_PATH";

/// Main configuration for rssd.
#[derive(Debug, Clone)]
pub struct RssdConfig {
    /// Path to the `SQLite` database file.
    pub db_path: PathBuf,
    /// HTTP listening address.
    pub http_addr: SocketAddr,
    /// Shutdown grace period for existing connections.
    pub http_grace: Duration,
    /// Directory served under `/static`.
    pub static_dir: PathBuf,
    /// Storage pragmas.
    pub storage: StorageConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
}

/// Logging settings as read from config (resolved in `observability`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `rssd=debug,tower_http=info`.
    pub level: Option<String>,
    /// Output format: `compact`, `pretty` or `json`.
    pub format: Option<String>,
    /// Optional log file; stderr when unset.
    pub file: Option<PathBuf>,
}

/// Metrics settings.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MetricsSettings {
    /// Whether to install the Prometheus recorder and expose `/metrics`.
    pub enabled: Option<bool>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Database path.
    pub db_path: Option<String>,
    /// HTTP listening address.
    pub http_addr: Option<String>,
    /// Shutdown grace period, e.g. `"10s"` or `"1m30s"`.
    #[serde(default, with = "humantime_serde")]
    pub http_grace: Option<Duration>,
    /// Shutdown grace period in seconds; `http_grace` wins if both are set.
    pub http_grace_secs: Option<u64>,
    /// Static file directory.
    pub static_dir: Option<String>,
    /// Storage section.
    pub storage: Option<ConfigFileStorage>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// Storage section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStorage {
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u64>,
    /// Journal mode name.
    pub journal_mode: Option<String>,
    /// Synchronous level name.
    pub synchronous: Option<String>,
    /// Whether foreign key enforcement is enabled.
    pub foreign_keys: Option<bool>,
}

impl Default for RssdConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            http_grace: DEFAULT_HTTP_GRACE,
            static_dir: PathBuf::from("static"),
            storage: StorageConfig::default(),
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

impl RssdConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a value
    /// in it is invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or a value is invalid.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `RSSD_CONFIG_PATH` first, then the platform config dir
    /// (`~/.config/rssd/config.toml` on Linux). Returns defaults when no file
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be loaded.
    pub fn load_default() -> Result<Self> {
        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            if !config_path.trim().is_empty() {
                return Self::load_from_file(Path::new(&config_path));
            }
        }

        let Some(dirs) = directories::ProjectDirs::from("", "", "rssd") else {
            return Ok(Self::default());
        };

        let path = dirs.config_dir().join("config.toml");
        if path.exists() {
            return Self::load_from_file(&path);
        }

        Ok(Self::default())
    }

    /// Converts a `ConfigFile` to `RssdConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(db_path) = file.db_path {
            config.db_path = PathBuf::from(db_path);
        }
        if let Some(addr) = file.http_addr {
            config.http_addr = parse_addr(&addr)?;
        }
        if let Some(grace) = file
            .http_grace
            .or_else(|| file.http_grace_secs.map(Duration::from_secs))
        {
            config.http_grace = grace;
        }
        if let Some(static_dir) = file.static_dir {
            config.static_dir = PathBuf::from(static_dir);
        }
        if let Some(storage) = file.storage {
            if let Some(ms) = storage.busy_timeout_ms {
                config.storage.busy_timeout = Duration::from_millis(ms);
            }
            if let Some(mode) = storage.journal_mode {
                config.storage.journal_mode = JournalMode::from_str(&mode)?;
            }
            if let Some(level) = storage.synchronous {
                config.storage.synchronous = SynchronousMode::from_str(&level)?;
            }
            if let Some(v) = storage.foreign_keys {
                config.storage.foreign_keys = v;
            }
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(metrics) = file.metrics {
            config.metrics = metrics;
        }

        Ok(config)
    }

    /// Applies `RSSD_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an override holds an invalid value.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// `lookup` receives variable names such as `RSSD_DB`; empty values are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if an override holds an invalid value.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(db) = get("RSSD_DB") {
            self.db_path = PathBuf::from(db);
        }
        if let Some(addr) = get("RSSD_HTTP_ADDR") {
            self.http_addr = parse_addr(&addr)?;
        }
        if let Some(level) = get("RSSD_LOG_LEVEL") {
            self.logging.level = Some(level);
        }
        if let Some(format) = get("RSSD_LOG_FORMAT") {
            self.logging.format = Some(format);
        }
        if let Some(enabled) = get("RSSD_METRICS_ENABLED") {
            self.metrics.enabled = Some(parse_bool(&enabled)?);
        }

        Ok(())
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Sets the HTTP listening address.
    #[must_use]
    pub const fn with_http_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = addr;
        self
    }

    /// Sets the shutdown grace period.
    #[must_use]
    pub const fn with_http_grace(mut self, grace: Duration) -> Self {
        self.http_grace = grace;
        self
    }
}

/// Parses a listening address.
///
/// Accepts Go-style `:8080` as shorthand for all interfaces.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the address cannot be parsed.
pub fn parse_addr(s: &str) -> Result<SocketAddr> {
    let s = s.trim();
    let candidate = if s.starts_with(':') {
        format!("0.0.0.0{s}")
    } else {
        s.to_string()
    };
    candidate
        .parse()
        .map_err(|e| Error::InvalidInput(format!("invalid listen address '{s}': {e}")))
}

/// Parses a duration such as `10s`, `1m30s`, `1.5s`, `1h` or a bare number
/// of seconds.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the value is not a valid duration.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return s
            .parse()
            .map(Duration::from_secs)
            .map_err(|e| Error::InvalidInput(format!("invalid duration '{s}': {e}")));
    }
    // Fractional seconds, e.g. `1.5s`.
    if let Some(secs) = s
        .strip_suffix('s')
        .filter(|v| v.contains('.'))
        .and_then(|v| v.parse::<f64>().ok())
    {
        return Duration::try_from_secs_f64(secs)
            .map_err(|e| Error::InvalidInput(format!("invalid duration '{s}': {e}")));
    }
    humantime::parse_duration(s)
        .map_err(|e| Error::InvalidInput(format!("invalid duration '{s}': {e}")))
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidInput(format!("invalid boolean '{other}'"))),
    }
}
