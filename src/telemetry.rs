//! Tracing subscriber setup for binaries embedding the core.

use crate::config::LoggingConfig;
use crate::error::CoreError;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides `config.level`.
///
/// Fails if a subscriber is already installed or the directive is invalid.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), CoreError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| CoreError::Telemetry(format!("invalid log level `{}`: {e}", config.level)))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|e| CoreError::Telemetry(e.to_string()))
}
