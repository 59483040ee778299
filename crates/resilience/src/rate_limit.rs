//! Sliding-window rate limiting per `(identifier, limiter)` pair.
//!
//! Each window keeps the instants of the requests it admitted during the
//! trailing `window`. A check drops expired instants, then admits the request
//! if fewer than `max_requests` remain. Rejections carry `reset_at`, the moment
//! the oldest counted request leaves the window.

use crate::error::RateLimitError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for one class of traffic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Length of the trailing window, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub window: Duration,
    /// Requests admitted per window. Zero rejects everything.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        presets::standard()
    }
}

impl RateLimitConfig {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_max_requests(mut self, max: u32) -> Self {
        self.max_requests = max;
        self
    }
}

/// Outcome of a single [`SlidingWindowLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests still available in the current window.
    pub remaining: u32,
    /// When the oldest counted request leaves the window.
    pub reset_at: Instant,
    pub limit: u32,
}

impl RateLimitDecision {
    /// Time until `reset_at`, zero if it already passed.
    pub fn retry_after(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    limiter: String,
    identifier: String,
}

#[derive(Debug)]
struct Window {
    hits: VecDeque<Instant>,
    /// Window length used by the most recent check.
    span: Duration,
    last_seen: Instant,
}

impl Window {
    fn new(span: Duration, now: Instant) -> Self {
        Self {
            hits: VecDeque::new(),
            span,
            last_seen: now,
        }
    }

    /// Drop instants that are a full `span` or more in the past.
    fn evict_expired(&mut self, now: Instant) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= self.span {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_stale(&self, now: Instant, idle_grace: Duration) -> bool {
        let drained = match self.hits.back() {
            Some(&newest) => now.saturating_duration_since(newest) >= self.span,
            None => true,
        };
        drained && now.saturating_duration_since(self.last_seen) >= idle_grace
    }
}

#[derive(Debug, Default)]
struct LimiterCounters {
    allowed: AtomicU64,
    rejected: AtomicU64,
}

/// Statistics for one limiter name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStats {
    pub limiter: String,
    /// Windows currently held in memory (one per identifier).
    pub tracked_windows: usize,
    pub allowed: u64,
    pub rejected: u64,
}

impl RateLimitStats {
    /// Calculate rejection rate (0.0 to 1.0).
    pub fn rejection_rate(&self) -> f64 {
        let total = self.allowed + self.rejected;
        if total == 0 {
            0.0
        } else {
            self.rejected as f64 / total as f64
        }
    }
}

/// Sliding-window limiter shared by every caller in the process.
///
/// Window mutation happens under the map's per-entry lock, so racing checks
/// for the same pair serialize without double counting.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    windows: DashMap<WindowKey, Window>,
    counters: DashMap<String, Arc<LimiterCounters>>,
    configs: DashMap<String, RateLimitConfig>,
    idle_grace: Duration,
}

impl SlidingWindowLimiter {
    /// A limiter with the built-in presets registered.
    pub fn new() -> Self {
        let limiter = Self {
            windows: DashMap::new(),
            counters: DashMap::new(),
            configs: DashMap::new(),
            idle_grace: Duration::from_secs(60),
        };
        for (name, config) in presets::all() {
            limiter.configs.insert(name.to_string(), config);
        }
        limiter
    }

    /// How long an empty window must sit idle before [`sweep`](Self::sweep) drops it.
    pub fn with_idle_grace(mut self, grace: Duration) -> Self {
        self.idle_grace = grace;
        self
    }

    /// Register (or replace) a named config for [`check_named`](Self::check_named).
    pub fn register(&self, name: &str, config: RateLimitConfig) -> Result<(), RateLimitError> {
        if name.trim().is_empty() {
            return Err(RateLimitError::InvalidConfig(
                "limiter name must not be empty".into(),
            ));
        }
        self.configs.insert(name.to_string(), config);
        Ok(())
    }

    /// Look up a registered config or preset by name.
    pub fn config(&self, name: &str) -> Option<RateLimitConfig> {
        self.configs.get(name).map(|c| *c.value())
    }

    /// Record a request for `identifier` against `limiter` and decide it.
    pub fn check(
        &self,
        identifier: &str,
        limiter: &str,
        config: &RateLimitConfig,
    ) -> RateLimitDecision {
        let now = Instant::now();
        let key = WindowKey {
            limiter: limiter.to_string(),
            identifier: identifier.to_string(),
        };

        let decision = {
            let mut window = self
                .windows
                .entry(key)
                .or_insert_with(|| Window::new(config.window, now));
            window.span = config.window;
            window.last_seen = now;
            window.evict_expired(now);

            let count = window.hits.len() as u32;
            if count < config.max_requests {
                window.hits.push_back(now);
                let oldest = window.hits.front().copied().unwrap_or(now);
                RateLimitDecision {
                    allowed: true,
                    remaining: config.max_requests - count - 1,
                    reset_at: expiry(oldest, config.window),
                    limit: config.max_requests,
                }
            } else {
                let oldest = window.hits.front().copied().unwrap_or(now);
                RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_at: expiry(oldest, config.window),
                    limit: config.max_requests,
                }
            }
        };

        let counters = self.counters_for(limiter);
        if decision.allowed {
            counters.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                limiter,
                identifier,
                retry_after_ms = decision.retry_after().as_millis() as u64,
                "rate limit exceeded"
            );
        }

        decision
    }

    /// [`check`](Self::check) using a registered config or preset.
    pub fn check_named(
        &self,
        identifier: &str,
        limiter: &str,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let config = self
            .config(limiter)
            .ok_or_else(|| RateLimitError::UnknownLimiter(limiter.to_string()))?;
        Ok(self.check(identifier, limiter, &config))
    }

    fn counters_for(&self, limiter: &str) -> Arc<LimiterCounters> {
        if let Some(existing) = self.counters.get(limiter) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .counters
            .entry(limiter.to_string())
            .or_insert_with(|| Arc::new(LimiterCounters::default()));
        Arc::clone(entry.value())
    }

    /// Stats for one limiter, or every limiter seen so far, sorted by name.
    pub fn stats(&self, limiter: Option<&str>) -> Vec<RateLimitStats> {
        let mut tracked: std::collections::HashMap<String, usize> =
            std::collections::HashMap::new();
        for entry in self.windows.iter() {
            let name = &entry.key().limiter;
            if limiter.map_or(true, |wanted| wanted == name) {
                *tracked.entry(name.clone()).or_default() += 1;
            }
        }

        let mut stats: Vec<RateLimitStats> = self
            .counters
            .iter()
            .filter(|entry| limiter.map_or(true, |wanted| wanted == entry.key()))
            .map(|entry| RateLimitStats {
                limiter: entry.key().clone(),
                tracked_windows: tracked.get(entry.key()).copied().unwrap_or(0),
                allowed: entry.value().allowed.load(Ordering::Relaxed),
                rejected: entry.value().rejected.load(Ordering::Relaxed),
            })
            .collect();
        stats.sort_by(|a, b| a.limiter.cmp(&b.limiter));
        stats
    }

    /// Clear windows.
    ///
    /// Both set: one window. Identifier only: that caller on every limiter.
    /// Limiter only: the whole limiter, counters included. Neither: everything.
    pub fn reset(&self, identifier: Option<&str>, limiter: Option<&str>) {
        match (identifier, limiter) {
            (Some(identifier), Some(limiter)) => {
                self.windows.remove(&WindowKey {
                    limiter: limiter.to_string(),
                    identifier: identifier.to_string(),
                });
            }
            (Some(identifier), None) => {
                self.windows.retain(|key, _| key.identifier != identifier);
            }
            (None, Some(limiter)) => {
                self.windows.retain(|key, _| key.limiter != limiter);
                self.counters.remove(limiter);
            }
            (None, None) => {
                self.windows.clear();
                self.counters.clear();
            }
        }
        tracing::info!(?identifier, ?limiter, "rate limit windows reset");
    }

    /// Remove up to `batch_limit` windows that are empty and idle.
    ///
    /// Housekeeping only: a missing window and an empty one behave the same on
    /// the next check.
    pub fn sweep(&self, batch_limit: usize) -> usize {
        let now = Instant::now();
        let stale: Vec<WindowKey> = self
            .windows
            .iter()
            .filter(|entry| entry.value().is_stale(now, self.idle_grace))
            .take(batch_limit)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in stale {
            // Re-check under the write lock; a check may have landed meanwhile.
            if self
                .windows
                .remove_if(&key, |_, window| window.is_stale(now, self.idle_grace))
                .is_some()
            {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(removed, remaining = self.windows.len(), "swept idle rate windows");
        }
        removed
    }

    /// Number of windows currently held.
    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn expiry(oldest: Instant, window: Duration) -> Instant {
    oldest.checked_add(window).unwrap_or(oldest)
}

/// Named configs for common traffic classes.
pub mod presets {
    use super::*;

    pub const AI: &str = "ai";
    pub const HARDWARE: &str = "hardware";
    pub const AUTH: &str = "auth";
    pub const STANDARD: &str = "standard";

    /// Expensive AI-style calls: 10 per minute.
    pub fn ai() -> RateLimitConfig {
        RateLimitConfig::new(Duration::from_secs(60), 10)
    }

    /// Routine hardware polling: 300 per minute.
    pub fn hardware() -> RateLimitConfig {
        RateLimitConfig::new(Duration::from_secs(60), 300)
    }

    /// Authentication attempts: 5 per 15 minutes.
    pub fn auth() -> RateLimitConfig {
        RateLimitConfig::new(Duration::from_secs(15 * 60), 5)
    }

    /// General API traffic: 100 per minute.
    pub fn standard() -> RateLimitConfig {
        RateLimitConfig::new(Duration::from_secs(60), 100)
    }

    pub fn by_name(name: &str) -> Option<RateLimitConfig> {
        match name {
            AI => Some(ai()),
            HARDWARE => Some(hardware()),
            AUTH => Some(auth()),
            STANDARD => Some(standard()),
            _ => None,
        }
    }

    pub fn all() -> [(&'static str, RateLimitConfig); 4] {
        [
            (AI, ai()),
            (HARDWARE, hardware()),
            (AUTH, auth()),
            (STANDARD, standard()),
        ]
    }
}
