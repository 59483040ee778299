use crate::config::ConfigError;
use cache::CacheError;
use resilience::{BreakerError, RateLimitError};
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Errors from assembling or driving the core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cache setup failed: {0}")]
    Cache(#[from] CacheError),

    #[error("rate limit setup failed: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("failed to initialise tracing: {0}")]
    Telemetry(String),
}

/// Outcome of a rate-limited, breaker-guarded call that did not produce a value.
#[derive(Debug)]
pub enum GuardError<E> {
    /// The caller exceeded its window; nothing was attempted.
    RateLimited {
        limiter: String,
        identifier: String,
        retry_after: Duration,
    },
    /// The limiter name is not registered.
    UnknownLimiter(RateLimitError),
    /// Rejected by the breaker, or the guarded call failed or timed out.
    Breaker(BreakerError<E>),
}

impl<E> GuardError<E> {
    /// True for "try again shortly" outcomes: rate limited or circuit open.
    pub fn is_rejection(&self) -> bool {
        match self {
            GuardError::RateLimited { .. } => true,
            GuardError::Breaker(err) => err.is_rejection(),
            GuardError::UnknownLimiter(_) => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GuardError::RateLimited { retry_after, .. } => Some(*retry_after),
            GuardError::Breaker(err) => err.retry_after(),
            GuardError::UnknownLimiter(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for GuardError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::RateLimited {
                limiter,
                identifier,
                retry_after,
            } => write!(
                f,
                "rate limit `{limiter}` exceeded for {identifier}, retry in {retry_after:?}"
            ),
            GuardError::UnknownLimiter(err) => write!(f, "{err}"),
            GuardError::Breaker(err) => write!(f, "{err}"),
        }
    }
}

impl<E> Error for GuardError<E>
where
    E: fmt::Debug + fmt::Display + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GuardError::UnknownLimiter(err) => Some(err),
            GuardError::RateLimited { .. } | GuardError::Breaker(_) => None,
        }
    }
}

impl<E> From<BreakerError<E>> for GuardError<E> {
    fn from(value: BreakerError<E>) -> Self {
        GuardError::Breaker(value)
    }
}

impl<E> From<RateLimitError> for GuardError<E> {
    fn from(value: RateLimitError) -> Self {
        GuardError::UnknownLimiter(value)
    }
}
