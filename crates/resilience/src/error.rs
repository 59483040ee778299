use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`CircuitBreakerRegistry::execute`](crate::CircuitBreakerRegistry::execute).
///
/// `E` is the guarded call's own error type. Rejections (`Open`) and misuse
/// (`InvalidOperationName`) never carry one, which is why the registry-level
/// helpers default `E` to [`Infallible`].
#[derive(Debug, Error)]
pub enum BreakerError<E = Infallible> {
    /// Empty or whitespace-only operation names are a programming error.
    #[error("operation name must not be empty")]
    InvalidOperationName,
    /// The breaker refused the call without invoking it.
    #[error("circuit open for `{operation}`, retry in {retry_after:?}")]
    Open {
        operation: String,
        retry_after: Duration,
    },
    /// The guarded call did not settle before its deadline.
    #[error("`{operation}` timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },
    /// The guarded call ran and returned an error.
    #[error("`{operation}` failed: {error}")]
    Failed { operation: String, error: E },
}

impl<E> BreakerError<E> {
    /// True for "not even attempted" outcomes.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// True when the dependency itself failed or timed out.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            BreakerError::Failed { .. } | BreakerError::Timeout { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// How long the caller should wait before trying again, for rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BreakerError::Open { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Unwrap the guarded call's error, if that is what happened.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl BreakerError<Infallible> {
    /// Re-type an error that cannot carry a call error.
    pub fn widen<E>(self) -> BreakerError<E> {
        match self {
            BreakerError::InvalidOperationName => BreakerError::InvalidOperationName,
            BreakerError::Open {
                operation,
                retry_after,
            } => BreakerError::Open {
                operation,
                retry_after,
            },
            BreakerError::Timeout { operation, timeout } => {
                BreakerError::Timeout { operation, timeout }
            }
            BreakerError::Failed { error, .. } => match error {},
        }
    }
}

/// Errors surfaced by the rate limiter's by-name helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// No registered config or preset carries this name.
    #[error("unknown rate limiter: {0}")]
    UnknownLimiter(String),
    /// A config was registered with an empty name.
    #[error("invalid rate limit config: {0}")]
    InvalidConfig(String),
}
