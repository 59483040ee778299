//! Circuit breaker pattern for device and service resilience.
//!
//! One breaker per operation name (e.g. `matrix.route`, `dsp.set_gain`). After
//! `failure_threshold` consecutive failures the circuit opens and calls fail
//! fast. Once `reset_timeout` has elapsed a single trial call is let through;
//! its outcome decides between closing and re-opening the circuit.
//!
//! Breakers live in a [`CircuitBreakerRegistry`], created lazily on first use
//! and kept until an explicit [`reset`](CircuitBreakerRegistry::reset).

use crate::error::BreakerError;
use crate::latency::{LatencySummary, LatencyWindow};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// States of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests allowed.
    Closed,
    /// Failing fast - requests immediately rejected.
    Open,
    /// Testing if the dependency recovered - one trial call allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Duration to wait before attempting recovery (half-open), in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub reset_timeout: Duration,
    /// Deadline applied to every guarded call unless the call overrides it.
    #[serde(with = "crate::serde_millis::option")]
    pub call_timeout: Option<Duration>,
    /// Number of latency samples kept for percentile stats.
    pub latency_window: usize,
}

fn default_latency_window() -> usize {
    256
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            call_timeout: None,
            latency_window: default_latency_window(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_latency_window(mut self, samples: usize) -> Self {
        self.latency_window = samples;
        self
    }

    /// Apply per-call overrides on top of this config.
    fn merged(mut self, options: &CallOptions) -> Self {
        if let Some(threshold) = options.failure_threshold {
            self.failure_threshold = threshold;
        }
        if let Some(reset) = options.reset_timeout {
            self.reset_timeout = reset;
        }
        self
    }
}

/// Per-call knobs for [`CircuitBreakerRegistry::execute`].
///
/// `failure_threshold` and `reset_timeout` only take effect when the call
/// creates the breaker; `timeout` applies to every call that carries it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub failure_threshold: Option<u32>,
    pub reset_timeout: Option<Duration>,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = Some(timeout);
        self
    }
}

/// Mutable breaker state; every transition happens under one lock.
#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    latency: LatencyWindow,
}

/// Circuit breaker for a single operation name.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    core: Mutex<BreakerCore>,
    successes: AtomicU64,
    failures: AtomicU64,
    rejects: AtomicU64,
    timeouts: AtomicU64,
    fallbacks: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                opened_at: None,
                trial_in_flight: false,
                latency: LatencyWindow::new(config.latency_window),
            }),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejects: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        self.core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decide whether a call may proceed. `Err` carries the retry-after hint.
    fn admit(&self) -> Result<Admission, Duration> {
        let mut core = self.lock();

        match core.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let opened_at = core.opened_at.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                if elapsed >= self.config.reset_timeout {
                    core.state = CircuitState::HalfOpen;
                    core.trial_in_flight = true;
                    tracing::info!(operation = %self.name, "circuit half-open, admitting trial call");
                    Ok(Admission::Trial)
                } else {
                    Err(self.config.reset_timeout - elapsed)
                }
            }
            CircuitState::HalfOpen => {
                if core.trial_in_flight {
                    Err(Duration::ZERO)
                } else {
                    core.trial_in_flight = true;
                    Ok(Admission::Trial)
                }
            }
        }
    }

    fn record_success(&self, latency: Duration, admission: Admission) {
        self.successes.fetch_add(1, Ordering::Relaxed);

        let mut core = self.lock();
        core.latency.record(latency);

        match core.state {
            CircuitState::HalfOpen if admission == Admission::Trial => {
                core.state = CircuitState::Closed;
                core.consecutive_failures = 0;
                core.opened_at = None;
                core.trial_in_flight = false;
                tracing::info!(operation = %self.name, "circuit closed after successful trial");
            }
            CircuitState::Closed => {
                core.consecutive_failures = 0;
            }
            // A call admitted before the circuit opened; it does not close it.
            _ => {}
        }
    }

    fn record_failure(&self, latency: Duration, timed_out: bool, admission: Admission) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }

        let now = Instant::now();
        let mut core = self.lock();
        core.latency.record(latency);
        core.last_failure_at = Some(now);
        core.consecutive_failures = core.consecutive_failures.saturating_add(1);

        match core.state {
            CircuitState::Closed => {
                if core.consecutive_failures >= self.config.failure_threshold {
                    core.state = CircuitState::Open;
                    core.opened_at = Some(now);
                    tracing::warn!(
                        operation = %self.name,
                        failures = core.consecutive_failures,
                        "circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen if admission == Admission::Trial => {
                core.state = CircuitState::Open;
                core.opened_at = Some(now);
                core.trial_in_flight = false;
                tracing::warn!(operation = %self.name, timed_out, "trial call failed, circuit re-opened");
            }
            _ => {}
        }
    }

    /// Release a trial permit whose call never settled (its future was dropped).
    fn abandon_trial(&self) {
        let mut core = self.lock();
        if core.state == CircuitState::HalfOpen {
            core.trial_in_flight = false;
            tracing::debug!(operation = %self.name, "trial call abandoned");
        }
    }

    /// Run `op` through this breaker.
    pub async fn call<T, E, F, Fut>(
        &self,
        op: F,
        timeout: Option<Duration>,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(retry_after) => {
                self.rejects.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(operation = %self.name, ?retry_after, "call rejected by open circuit");
                return Err(BreakerError::Open {
                    operation: self.name.clone(),
                    retry_after,
                });
            }
        };

        let mut permit = CallPermit {
            breaker: self,
            admission,
            settled: false,
        };

        let started = Instant::now();
        let outcome = match timeout.or(self.config.call_timeout) {
            Some(limit) => tokio::time::timeout(limit, op()).await.map_err(|_| limit),
            None => Ok(op().await),
        };
        let latency = started.elapsed();

        match outcome {
            Ok(Ok(value)) => {
                permit.settle();
                self.record_success(latency, admission);
                Ok(value)
            }
            Ok(Err(error)) => {
                permit.settle();
                self.record_failure(latency, false, admission);
                Err(BreakerError::Failed {
                    operation: self.name.clone(),
                    error,
                })
            }
            Err(limit) => {
                permit.settle();
                self.record_failure(latency, true, admission);
                Err(BreakerError::Timeout {
                    operation: self.name.clone(),
                    timeout: limit,
                })
            }
        }
    }

    /// Get current state (for monitoring).
    pub fn current_state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get the current run of consecutive failures.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn note_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Return to a fresh closed breaker with zeroed counters.
    pub fn reset(&self) {
        let mut core = self.lock();
        core.state = CircuitState::Closed;
        core.consecutive_failures = 0;
        core.last_failure_at = None;
        core.opened_at = None;
        core.trial_in_flight = false;
        core.latency.clear();
        drop(core);

        for counter in [
            &self.successes,
            &self.failures,
            &self.rejects,
            &self.timeouts,
            &self.fallbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CircuitStats {
        let core = self.lock();
        CircuitStats {
            name: self.name.clone(),
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejects: self.rejects.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            latency: core.latency.summary(),
            last_failure_ms_ago: core.last_failure_at.map(|t| t.elapsed().as_millis() as u64),
            opened_ms_ago: core.opened_at.map(|t| t.elapsed().as_millis() as u64),
        }
    }
}

/// Marks an admitted call; an unsettled trial is released on drop.
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl CallPermit<'_> {
    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Trial {
            self.breaker.abandon_trial();
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitStats {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub successes: u64,
    pub failures: u64,
    pub rejects: u64,
    pub timeouts: u64,
    pub fallbacks: u64,
    pub latency: LatencySummary,
    pub last_failure_ms_ago: Option<u64>,
    pub opened_ms_ago: Option<u64>,
}

/// Process-wide set of breakers keyed by operation name.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    /// Get or create the breaker for an operation name.
    ///
    /// Creation goes through the map's entry lock, so racing first calls for
    /// one name always share a single breaker.
    pub fn get_or_create(
        &self,
        operation: &str,
        options: &CallOptions,
    ) -> Result<Arc<CircuitBreaker>, BreakerError> {
        if operation.trim().is_empty() {
            return Err(BreakerError::InvalidOperationName);
        }

        if let Some(existing) = self.breakers.get(operation) {
            return Ok(Arc::clone(existing.value()));
        }

        let entry = self
            .breakers
            .entry(operation.to_string())
            .or_insert_with(|| {
                tracing::debug!(operation, "creating circuit breaker");
                Arc::new(CircuitBreaker::new(
                    operation,
                    self.default_config.merged(options),
                ))
            });
        Ok(Arc::clone(entry.value()))
    }

    /// Run `op` behind the breaker for `operation`.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        op: F,
        options: &CallOptions,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.get_or_create(operation, options).map_err(BreakerError::widen)?;
        breaker.call(op, options.timeout).await
    }

    /// Like [`execute`](Self::execute), but substitutes `fallback()` when the
    /// call is rejected, fails, or times out.
    ///
    /// Misuse errors (empty operation name) still propagate.
    pub async fn execute_with_fallback<T, E, F, Fut, FB>(
        &self,
        operation: &str,
        op: F,
        fallback: FB,
        options: &CallOptions,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> T,
        E: fmt::Display,
    {
        let breaker = self.get_or_create(operation, options).map_err(BreakerError::widen)?;
        match breaker.call(op, options.timeout).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_rejection() || err.is_dependency_failure() => {
                breaker.note_fallback();
                tracing::debug!(operation, error = %err, "serving fallback");
                Ok(fallback())
            }
            Err(err) => Err(err),
        }
    }

    /// Get state of a specific operation, if it has a breaker yet.
    pub fn state(&self, operation: &str) -> Option<CircuitState> {
        self.breakers.get(operation).map(|b| b.current_state())
    }

    pub fn get_stats(&self, operation: &str) -> Option<CircuitStats> {
        self.breakers.get(operation).map(|b| b.stats())
    }

    /// Stats for every breaker, sorted by name.
    pub fn all_stats(&self) -> Vec<CircuitStats> {
        let mut stats: Vec<CircuitStats> = self
            .breakers
            .iter()
            .map(|entry| entry.value().stats())
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Names of the breakers currently open.
    pub fn open_circuits(&self) -> Vec<String> {
        let mut open: Vec<String> = self
            .breakers
            .iter()
            .filter(|entry| entry.value().current_state() == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect();
        open.sort();
        open
    }

    /// True when no breaker is currently open.
    pub fn is_healthy(&self) -> bool {
        self.breakers
            .iter()
            .all(|entry| entry.value().current_state() != CircuitState::Open)
    }

    /// Reset one breaker, or drop all of them when `operation` is `None`.
    pub fn reset(&self, operation: Option<&str>) {
        match operation {
            Some(name) => {
                if let Some(breaker) = self.breakers.get(name) {
                    breaker.reset();
                    tracing::info!(operation = name, "circuit breaker reset");
                }
            }
            None => {
                self.breakers.clear();
                tracing::info!("all circuit breakers reset");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn registry(threshold: u32, reset: Duration) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(
            CircuitBreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_reset_timeout(reset),
        )
    }

    async fn fail(registry: &CircuitBreakerRegistry, name: &str) {
        let result = registry
            .execute(name, || async { Err::<(), _>("boom".to_string()) }, &CallOptions::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_starts_closed() {
        let registry = CircuitBreakerRegistry::default();
        let value = registry
            .execute("matrix.route", || async { Ok::<_, String>(42) }, &CallOptions::default())
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(registry.state("matrix.route"), Some(CircuitState::Closed));
        assert!(registry.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_skips_op() {
        let registry = registry(3, Duration::from_secs(30));
        for _ in 0..3 {
            fail(&registry, "cec.power").await;
        }
        assert_eq!(registry.state("cec.power"), Some(CircuitState::Open));

        let calls = AtomicU32::new(0);
        let err = registry
            .execute(
                "cec.power",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                },
                &CallOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(err.is_rejection());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!registry.is_healthy());
        assert_eq!(registry.open_circuits(), vec!["cec.power".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_failures() {
        let registry = registry(3, Duration::from_secs(30));
        fail(&registry, "dsp").await;
        fail(&registry, "dsp").await;
        registry
            .execute("dsp", || async { Ok::<_, String>(()) }, &CallOptions::default())
            .await
            .unwrap();

        fail(&registry, "dsp").await;
        fail(&registry, "dsp").await;
        assert_eq!(registry.state("dsp"), Some(CircuitState::Closed));
        assert_eq!(registry.get_stats("dsp").unwrap().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_success_closes() {
        let registry = registry(1, Duration::from_millis(100));
        fail(&registry, "adb").await;
        assert_eq!(registry.state("adb"), Some(CircuitState::Open));

        tokio::time::advance(Duration::from_millis(150)).await;
        registry
            .execute("adb", || async { Ok::<_, String>(()) }, &CallOptions::default())
            .await
            .unwrap();

        let stats = registry.get_stats("adb").unwrap();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens_and_restarts_timer() {
        let registry = registry(1, Duration::from_millis(100));
        fail(&registry, "adb").await;
        tokio::time::advance(Duration::from_millis(150)).await;

        fail(&registry, "adb").await;
        assert_eq!(registry.state("adb"), Some(CircuitState::Open));

        // Reset timer restarted at the failed trial
        tokio::time::advance(Duration::from_millis(50)).await;
        let err = registry
            .execute("adb", || async { Ok::<_, String>(()) }, &CallOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_rejection());
        assert!(err.retry_after().unwrap() <= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_trial_in_flight() {
        let registry = Arc::new(registry(1, Duration::from_millis(100)));
        fail(&registry, "matrix").await;
        tokio::time::advance(Duration::from_millis(150)).await;

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let trial_registry = registry.clone();
        let trial = tokio::spawn(async move {
            trial_registry
                .execute(
                    "matrix",
                    || async move {
                        rx.await.ok();
                        Ok::<_, String>("probe")
                    },
                    &CallOptions::default(),
                )
                .await
        });
        tokio::task::yield_now().await;
        assert_eq!(registry.state("matrix"), Some(CircuitState::HalfOpen));

        let err = registry
            .execute("matrix", || async { Ok::<_, String>("second") }, &CallOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_rejection());

        tx.send(()).unwrap();
        assert_eq!(trial.await.unwrap().unwrap(), "probe");
        assert_eq!(registry.state("matrix"), Some(CircuitState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_releases_permit() {
        let registry = registry(1, Duration::from_millis(100));
        fail(&registry, "tcp").await;
        tokio::time::advance(Duration::from_millis(150)).await;

        {
            let opts = CallOptions::default();
            let abandoned = registry.execute(
                "tcp",
                || std::future::pending::<Result<(), String>>(),
                &opts,
            );
            // Poll once so the trial is admitted, then drop it
            let _ = tokio::time::timeout(Duration::from_millis(1), abandoned).await;
        }

        assert_eq!(registry.state("tcp"), Some(CircuitState::HalfOpen));
        registry
            .execute("tcp", || async { Ok::<_, String>(()) }, &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(registry.state("tcp"), Some(CircuitState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let registry = registry(2, Duration::from_secs(30));
        let options = CallOptions::default().with_timeout(Duration::from_millis(50));

        for _ in 0..2 {
            let err = registry
                .execute(
                    "slow.device",
                    || async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok::<_, String>(())
                    },
                    &options,
                )
                .await
                .unwrap_err();
            assert!(err.is_timeout());
        }

        let stats = registry.get_stats("slow.device").unwrap();
        assert_eq!(stats.timeouts, 2);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.state, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_counts_as_reject_when_open() {
        let registry = registry(1, Duration::from_secs(30));
        fail(&registry, "tuner").await;

        let value = registry
            .execute_with_fallback(
                "tuner",
                || async { Ok::<_, String>("live") },
                || "cached",
                &CallOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(value, "cached");
        let stats = registry.get_stats("tuner").unwrap();
        assert_eq!(stats.rejects, 1);
        assert_eq!(stats.fallbacks, 1);
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test]
    async fn empty_operation_name_rejected() {
        let registry = CircuitBreakerRegistry::default();
        let err = registry
            .execute("  ", || async { Ok::<_, String>(()) }, &CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerError::InvalidOperationName));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn overrides_apply_on_creation() {
        let registry = CircuitBreakerRegistry::default();
        let options = CallOptions::default().with_failure_threshold(2);
        let breaker = registry.get_or_create("relay", &options).unwrap();
        assert_eq!(breaker.config().failure_threshold, 2);

        // Later overrides do not reconfigure the existing breaker
        let again = registry
            .get_or_create("relay", &CallOptions::default().with_failure_threshold(9))
            .unwrap();
        assert_eq!(again.config().failure_threshold, 2);
        assert!(Arc::ptr_eq(&breaker, &again));
    }

    #[test]
    fn concurrent_first_calls_share_one_breaker() {
        let registry = Arc::new(CircuitBreakerRegistry::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .get_or_create("shared", &CallOptions::default())
                        .unwrap()
                })
            })
            .collect();

        let breakers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for breaker in &breakers[1..] {
            assert!(Arc::ptr_eq(&breakers[0], breaker));
        }
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_single_and_all() {
        let registry = registry(1, Duration::from_secs(30));
        fail(&registry, "a").await;
        fail(&registry, "b").await;

        registry.reset(Some("a"));
        let stats = registry.get_stats("a").unwrap();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failures, 0);
        assert_eq!(registry.state("b"), Some(CircuitState::Open));

        registry.reset(None);
        assert!(registry.is_empty());
        assert!(registry.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn stats_serialize_for_dashboards() {
        let registry = CircuitBreakerRegistry::default();
        registry
            .execute(
                "poll",
                || async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, String>(())
                },
                &CallOptions::default(),
            )
            .await
            .unwrap();

        let stats = registry.get_stats("poll").unwrap();
        assert_eq!(stats.latency.samples, 1);
        assert!(stats.latency.p50_ms >= 20.0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["state"], "closed");
        assert_eq!(json["successes"], 1);
    }
}
