//! Prometheus metrics.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Metrics configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsConfig {
    /// Whether the Prometheus recorder is installed.
    pub enabled: bool,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        Self {
            enabled: settings.and_then(|s| s.enabled).unwrap_or(false),
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// Scraping goes through the HTTP router's `/metrics` route rather than a
/// separate listener.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<PrometheusHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    PrometheusBuilder::new()
        .install_recorder()
        .map(Some)
        .map_err(|e| Error::operation("metrics_recorder_install", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_installs_nothing() {
        let handle = install_prometheus(&MetricsConfig { enabled: false }).unwrap();
        assert!(handle.is_none());
    }

    #[test]
    fn test_from_settings() {
        let settings = MetricsSettings {
            enabled: Some(true),
        };
        assert!(MetricsConfig::from_settings(Some(&settings)).enabled);
        assert!(!MetricsConfig::from_settings(None).enabled);
    }
}
