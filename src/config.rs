//! Layered configuration for the core.
//!
//! Settings come from an optional YAML file, then `AVCORE__*` environment
//! variables (double underscore between levels), then validation. Durations
//! are plain milliseconds everywhere.
//!
//! ## Example
//!
//! ```yaml
//! logging:
//!   level: "info,resilience=debug"
//!   json: true
//!
//! breaker:
//!   failure_threshold: 5
//!   reset_timeout: 30000
//!   call_timeout: 4000
//!
//! rate_limits:
//!   panel:
//!     window: 1000
//!     max_requests: 20
//!
//! cache:
//!   presets: true
//!   namespaces:
//!     sports:
//!       ttl: 15000
//!       max_entries: 200
//!
//! transactions:
//!   retries: 3
//!   retry_delay: 50
//!   backoff: exponential
//!
//! janitor:
//!   interval: 1000
//!   cache_batch: 500
//!   rate_batch: 500
//! ```
//!
//! `AVCORE__BREAKER__FAILURE_THRESHOLD=3` overrides the file.

use cache::NamespaceConfig;
use resilience::{presets as rate_presets, CircuitBreakerConfig, RateLimitConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use txn::TxOptions;

pub const ENV_PREFIX: &str = "AVCORE";
pub const DEFAULT_CONFIG_NAME: &str = "avcore";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Register `volatile`, `reference` and `device_status`.
    pub presets: bool,
    pub namespaces: BTreeMap<String, NamespaceConfig>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            presets: true,
            namespaces: BTreeMap::new(),
        }
    }
}

/// Background housekeeping cadence and batch sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    pub enabled: bool,
    #[serde(with = "resilience::serde_millis")]
    pub interval: Duration,
    /// Most expired cache entries dropped per tick.
    pub cache_batch: usize,
    /// Most idle rate windows dropped per tick.
    pub rate_batch: usize,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(1),
            cache_batch: 500,
            rate_batch: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CoreConfig {
    pub logging: LoggingConfig,
    /// Defaults for every breaker the registry creates.
    pub breaker: CircuitBreakerConfig,
    /// Extra named limiters on top of the built-in presets.
    pub rate_limits: BTreeMap<String, RateLimitConfig>,
    pub cache: CacheSection,
    /// Defaults for wrapped transactions; `name` is replaced per call.
    pub transactions: TxOptions,
    pub janitor: JanitorConfig,
}

impl CoreConfig {
    /// Load `avcore.{yaml,yml,...}` from the working directory if present,
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None, None)
    }

    /// Load from an explicit file (required when given) and, for tests, an
    /// explicit environment map instead of the process environment.
    pub fn load_from(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let config: CoreConfig = config::Config::builder()
            .add_source(file)
            .add_source(environment(env))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document, with environment overrides from `env` only.
    pub fn from_yaml(
        yaml: &str,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let config: CoreConfig = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .add_source(environment(Some(env.unwrap_or_default())))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Validation(
                "breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if self.breaker.reset_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "breaker.reset_timeout must be greater than 0".into(),
            ));
        }
        if self.breaker.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Validation(
                "breaker.call_timeout must be greater than 0 when set".into(),
            ));
        }

        for (name, limit) in &self.rate_limits {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "rate_limits keys must not be empty".into(),
                ));
            }
            if limit.window.is_zero() {
                return Err(ConfigError::Validation(format!(
                    "rate_limits.{name}.window must be greater than 0"
                )));
            }
        }

        for (name, ns) in &self.cache.namespaces {
            if ns.max_entries == 0 {
                return Err(ConfigError::Validation(format!(
                    "cache.namespaces.{name}.max_entries must be greater than 0"
                )));
            }
            if self.cache.presets && cache::presets::all().iter().any(|(p, _)| *p == name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "cache.namespaces.{name} collides with a preset; set cache.presets = false to redefine it"
                )));
            }
        }

        if self.transactions.max_delay < self.transactions.retry_delay {
            return Err(ConfigError::Validation(
                "transactions.max_delay must be >= transactions.retry_delay".into(),
            ));
        }

        if self.janitor.enabled {
            if self.janitor.interval.is_zero() {
                return Err(ConfigError::Validation(
                    "janitor.interval must be greater than 0".into(),
                ));
            }
            if self.janitor.cache_batch == 0 || self.janitor.rate_batch == 0 {
                return Err(ConfigError::Validation(
                    "janitor batch sizes must be greater than 0".into(),
                ));
            }
        }

        Ok(())
    }

    /// Every named limiter the core will know about: presets plus configured.
    pub fn all_rate_limits(&self) -> BTreeMap<String, RateLimitConfig> {
        let mut limits: BTreeMap<String, RateLimitConfig> = rate_presets::all()
            .into_iter()
            .map(|(name, config)| (name.to_string(), config))
            .collect();
        limits.extend(self.rate_limits.iter().map(|(k, v)| (k.clone(), *v)));
        limits
    }
}

fn environment(vars: Option<config::Map<String, String>>) -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .source(vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoreConfig::default();
        config.validate().unwrap();
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.reset_timeout, Duration::from_secs(30));
        assert!(config.cache.presets);
        assert_eq!(config.transactions.retries, 3);
    }

    #[test]
    fn yaml_sections_are_partial() {
        let yaml = r#"
breaker:
  failure_threshold: 3
rate_limits:
  panel:
    window: 1000
    max_requests: 20
cache:
  namespaces:
    sports:
      ttl: 15000
      max_entries: 200
transactions:
  backoff: exponential
"#;
        let config = CoreConfig::from_yaml(yaml, None).unwrap();
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.reset_timeout, Duration::from_secs(30));
        assert_eq!(config.rate_limits["panel"].max_requests, 20);
        assert_eq!(
            config.cache.namespaces["sports"].ttl,
            Duration::from_secs(15)
        );
        assert_eq!(config.transactions.backoff, txn::Backoff::Exponential);
        assert!(config.all_rate_limits().contains_key("auth"));
    }

    #[test]
    fn environment_overrides_file() {
        let mut env = config::Map::new();
        env.insert(
            "AVCORE__BREAKER__FAILURE_THRESHOLD".to_string(),
            "7".to_string(),
        );
        env.insert("AVCORE__LOGGING__JSON".to_string(), "true".to_string());

        let config = CoreConfig::from_yaml("breaker:\n  failure_threshold: 3\n", Some(env)).unwrap();
        assert_eq!(config.breaker.failure_threshold, 7);
        assert!(config.logging.json);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = CoreConfig::from_yaml("breaker:\n  failure_threshold: 0\n", None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let yaml = "cache:\n  namespaces:\n    tiny:\n      ttl: 10\n      max_entries: 0\n";
        assert!(CoreConfig::from_yaml(yaml, None).is_err());

        let yaml = "cache:\n  namespaces:\n    volatile:\n      ttl: 10\n      max_entries: 5\n";
        assert!(CoreConfig::from_yaml(yaml, None).is_err());
    }

    #[test]
    fn janitor_interval_is_milliseconds() {
        let config = CoreConfig::from_yaml("janitor:\n  interval: 250\n", None).unwrap();
        assert_eq!(config.janitor.interval, Duration::from_millis(250));
        assert_eq!(config.janitor.cache_batch, 500);

        let encoded = serde_json::to_value(config.janitor).unwrap();
        assert_eq!(encoded["interval"], 250);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = CoreConfig::load_from(
            Some(Path::new("/nonexistent/avcore.yaml")),
            Some(config::Map::new()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
