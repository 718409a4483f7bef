//! Logging bootstrap built on `tracing-subscriber`.

#[cfg(feature = "telemetry")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::BastionResult;
use serde::{Deserialize, Serialize};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Default filter directive when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_service_name() -> String {
    "bastion".to_string()
}

fn default_log_level() -> String {
    "info,bastion=debug".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// returns an error instead of panicking.
#[cfg(feature = "telemetry")]
pub fn init_telemetry(config: &TelemetryConfig) -> BastionResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| crate::BastionError::Configuration(format!("Invalid log filter: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
    result.map_err(|e| crate::BastionError::Internal(format!("Failed to install subscriber: {e}")))?;

    tracing::info!(
        service_name = %config.service_name,
        format = ?config.format,
        "Telemetry initialized"
    );

    Ok(())
}

/// Placeholder for when the telemetry feature is disabled.
#[cfg(not(feature = "telemetry"))]
pub fn init_telemetry(_config: &TelemetryConfig) -> BastionResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "bastion");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.log_level.starts_with("info"));
    }

    #[test]
    fn test_config_deserialization() {
        let json = r#"{"service_name": "bastion-test", "format": "json"}"#;
        let config: TelemetryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.service_name, "bastion-test");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_level, default_log_level());
    }
}
