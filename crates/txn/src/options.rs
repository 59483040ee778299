//! Per-call knobs for the transaction wrapper.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Transaction mode requested from the store.
///
/// Only diagnostic as far as the wrapper is concerned: retries behave the same
/// for every level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::Deferred => write!(f, "deferred"),
            Isolation::Immediate => write!(f, "immediate"),
            Isolation::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// How the wait grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `retry_delay * n` before retry `n`.
    #[default]
    Linear,
    /// `retry_delay * 2^(n-1)` before retry `n`.
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxOptions {
    /// Label used in logs and reports.
    pub name: String,
    /// Retries after the first attempt, for transient lock errors only.
    pub retries: u32,
    #[serde(with = "crate::serde_millis")]
    pub retry_delay: Duration,
    /// Upper bound on a single wait.
    #[serde(with = "crate::serde_millis")]
    pub max_delay: Duration,
    pub backoff: Backoff,
    /// Add up to 50% random jitter to each wait.
    pub jitter: bool,
    pub isolation: Isolation,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            name: "transaction".to_string(),
            retries: 3,
            retry_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff: Backoff::Linear,
            jitter: false,
            isolation: Isolation::Deferred,
        }
    }
}

impl TxOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let base = self.retry_delay.as_millis() as u64;
        let scaled = match self.backoff {
            Backoff::Linear => base.saturating_mul(u64::from(retry)),
            Backoff::Exponential => {
                let factor = 1u64.checked_shl(retry - 1).unwrap_or(u64::MAX);
                base.saturating_mul(factor)
            }
        };
        let delay = scaled.min(self.max_delay.as_millis() as u64);

        if self.jitter {
            let jitter = fastrand::u64(0..=delay / 2);
            Duration::from_millis(delay + jitter)
        } else {
            Duration::from_millis(delay)
        }
    }
}
