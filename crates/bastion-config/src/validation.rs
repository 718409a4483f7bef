//! Configuration validation.
//!
//! Collects every problem in one pass so a misconfigured deployment fails
//! at startup with the full list.

use crate::{AppConfig, CacheConfig};
use std::fmt;
use url::Url;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Pool size configuration is invalid (min must be <= max).
    InvalidPoolSize { min: u32, max: u32 },
    /// Pool size exceeds maximum allowed.
    PoolSizeTooLarge { value: u32, maximum: u32 },
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Duration value must be positive.
    NonPositiveDuration { name: String },
    /// Jitter percent is outside the accepted range.
    InvalidJitterPercent { value: u32, maximum: u32 },
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Log format is invalid.
    InvalidLogFormat { value: String },
    /// Metrics listen address is not a socket address.
    InvalidListenAddr { value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPoolSize { min, max } => {
                write!(f, "Invalid pool size: min ({min}) cannot be greater than max ({max})")
            }
            Self::PoolSizeTooLarge { value, maximum } => {
                write!(f, "Pool size {value} exceeds maximum allowed ({maximum})")
            }
            Self::InvalidUrl { url_type, message } => write!(f, "Invalid {url_type} URL: {message}"),
            Self::NonPositiveDuration { name } => write!(f, "'{name}' must be positive"),
            Self::InvalidJitterPercent { value, maximum } => {
                write!(f, "Invalid jitter percent: {value} (must be between 0 and {maximum})")
            }
            Self::InvalidLogLevel { value } => {
                write!(f, "Invalid log level: '{value}' (valid: trace, debug, info, warn, error)")
            }
            Self::InvalidLogFormat { value } => write!(f, "Invalid log format: '{value}' (valid: json, pretty)"),
            Self::InvalidListenAddr { value } => write!(f, "Invalid metrics listen address: '{value}'"),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Maximum connection pool size.
    const MAX_POOL_SIZE: u32 = 1000;
    /// Valid log levels.
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];

    /// Validates the entire application configuration.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_database(config, &mut errors);
        Self::validate_redis(config, &mut errors);
        Self::validate_cache(&config.cache, &mut errors);
        Self::validate_scheduler(config, &mut errors);
        Self::validate_observability(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_database(config: &AppConfig, errors: &mut Vec<ConfigValidationError>) {
        let db = &config.database;
        match Url::parse(&db.url) {
            Ok(url) if url.scheme() == "mysql" => {}
            Ok(url) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "database".to_string(),
                message: format!("unsupported scheme '{}', expected mysql://", url.scheme()),
            }),
            Err(e) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "database".to_string(),
                message: e.to_string(),
            }),
        }

        if db.min_connections > db.max_connections {
            errors.push(ConfigValidationError::InvalidPoolSize {
                min: db.min_connections,
                max: db.max_connections,
            });
        }
        if db.max_connections > Self::MAX_POOL_SIZE {
            errors.push(ConfigValidationError::PoolSizeTooLarge {
                value: db.max_connections,
                maximum: Self::MAX_POOL_SIZE,
            });
        }
        if db.connect_timeout_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveDuration {
                name: "database.connect_timeout_secs".to_string(),
            });
        }
    }

    fn validate_redis(config: &AppConfig, errors: &mut Vec<ConfigValidationError>) {
        let redis = &config.redis;
        if !redis.enabled {
            return;
        }

        match Url::parse(&redis.url) {
            Ok(url) if matches!(url.scheme(), "redis" | "rediss") => {}
            Ok(_) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL must start with redis:// or rediss://".to_string(),
            }),
            Err(e) => errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: e.to_string(),
            }),
        }

        if redis.pool_size > Self::MAX_POOL_SIZE {
            errors.push(ConfigValidationError::PoolSizeTooLarge {
                value: redis.pool_size,
                maximum: Self::MAX_POOL_SIZE,
            });
        }
    }

    fn validate_cache(cache: &CacheConfig, errors: &mut Vec<ConfigValidationError>) {
        if cache.jitter_percent > CacheConfig::MAX_JITTER_PERCENT {
            errors.push(ConfigValidationError::InvalidJitterPercent {
                value: cache.jitter_percent,
                maximum: CacheConfig::MAX_JITTER_PERCENT,
            });
        }
        for (name, value) in [
            ("cache.default_ttl_secs", cache.default_ttl_secs),
            ("cache.user_ttl_secs", cache.user_ttl_secs),
            ("cache.not_found_ttl_secs", cache.not_found_ttl_secs),
        ] {
            if value == 0 {
                errors.push(ConfigValidationError::NonPositiveDuration { name: name.to_string() });
            }
        }
    }

    fn validate_scheduler(config: &AppConfig, errors: &mut Vec<ConfigValidationError>) {
        let scheduler = &config.scheduler;
        if scheduler.default_task_timeout_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveDuration {
                name: "scheduler.default_task_timeout_secs".to_string(),
            });
        }
        if scheduler.tick_interval_ms == 0 {
            errors.push(ConfigValidationError::NonPositiveDuration {
                name: "scheduler.tick_interval_ms".to_string(),
            });
        }
    }

    fn validate_observability(config: &AppConfig, errors: &mut Vec<ConfigValidationError>) {
        let observability = &config.observability;

        // Full filter directives ("info,sqlx=warn") are accepted as-is.
        let level = observability.log_level.to_lowercase();
        if !level.contains(['=', ',']) && !Self::VALID_LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ConfigValidationError::InvalidLogLevel {
                value: observability.log_level.clone(),
            });
        }

        if !matches!(observability.log_format.to_lowercase().as_str(), "json" | "pretty") {
            errors.push(ConfigValidationError::InvalidLogFormat {
                value: observability.log_format.clone(),
            });
        }

        if observability.metrics_enabled
            && observability
                .metrics_listen_addr
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            errors.push(ConfigValidationError::InvalidListenAddr {
                value: observability.metrics_listen_addr.clone(),
            });
        }
    }
}
