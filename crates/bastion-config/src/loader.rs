//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use bastion_core::BastionError;
use config::{Config, ConfigError, Environment, File};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Configuration loader with runtime refresh support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with the `BASTION__` prefix
    pub fn new(config_dir: impl Into<String>) -> Result<Self, BastionError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, BastionError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    pub async fn reload(&self) -> Result<(), BastionError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str) -> Result<AppConfig, BastionError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment = std::env::var("BASTION_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        info!(environment = %environment, "Loading configuration");

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{config_dir}/{name}.toml");
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("BASTION")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_bastion_error)?;

        let mut app_config: AppConfig = config.try_deserialize().map_err(config_error_to_bastion_error)?;
        app_config.cache = app_config.cache.normalized();

        ConfigValidator::validate(&app_config).map_err(|errors| {
            let message = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
            BastionError::Configuration(message)
        })?;

        Ok(app_config)
    }

    /// Gets a specific configuration value by dotted key path.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let config = self.config.read().await;
        let json = serde_json::to_value(&*config).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }
}

fn config_error_to_bastion_error(err: ConfigError) -> BastionError {
    BastionError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
[cache]
user_ttl_secs = 120
jitter_percent = 75

[scheduler]
lock_prefix = "jobs:lock:"
"#,
        )
        .unwrap();

        let loader = ConfigLoader::new(dir.path().to_string_lossy().to_string()).unwrap();
        let config = loader.get().await;

        assert_eq!(config.cache.user_ttl_secs, 120);
        // out-of-range jitter falls back to the default
        assert_eq!(config.cache.jitter_percent, 20);
        assert_eq!(config.scheduler.lock_prefix, "jobs:lock:");
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert!(format!("{loader:?}").contains("config_dir"));
    }

    #[tokio::test]
    async fn test_get_value_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().to_string_lossy().to_string()).unwrap();

        let prefix: Option<String> = loader.get_value("cache.key_prefix").await;
        assert_eq!(prefix.as_deref(), Some("cache"));

        let missing: Option<String> = loader.get_value("cache.nope").await;
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[database]\nmin_connections = 100\nmax_connections = 10\n",
        )
        .unwrap();

        let err = ConfigLoader::new(dir.path().to_string_lossy().to_string()).unwrap_err();
        assert!(matches!(err, BastionError::Configuration(_)));
    }
}
