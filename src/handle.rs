//! The shared handle callers hold: one breaker registry, one limiter, one
//! cache and the transaction defaults, built from a [`CoreConfig`].

use crate::config::CoreConfig;
use crate::error::{CoreError, GuardError};
use crate::health::HealthReport;
use cache::{CacheManager, GetOrSetError};
use resilience::{BreakerError, CallOptions, CircuitBreakerRegistry, SlidingWindowLimiter};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use txn::{TransactionMetrics, TransactionRunner, TransactionalStore, TxCounters, TxOptions};

/// Cheap to clone; every clone shares the same state.
#[derive(Debug, Clone)]
pub struct Core {
    breakers: Arc<CircuitBreakerRegistry>,
    limiter: Arc<SlidingWindowLimiter>,
    cache: Arc<CacheManager<Value>>,
    tx_defaults: TxOptions,
    tx_counters: Arc<TxCounters>,
}

impl Core {
    pub fn from_config(config: &CoreConfig) -> Result<Self, CoreError> {
        config.validate()?;

        let limiter = SlidingWindowLimiter::new();
        for (name, limit) in &config.rate_limits {
            limiter.register(name, *limit)?;
        }

        let cache = if config.cache.presets {
            CacheManager::with_presets()
        } else {
            CacheManager::new()
        };
        for (name, ns) in &config.cache.namespaces {
            cache.register_namespace(name, *ns)?;
        }

        tracing::info!(
            failure_threshold = config.breaker.failure_threshold,
            reset_timeout_ms = config.breaker.reset_timeout.as_millis() as u64,
            limiters = config.all_rate_limits().len(),
            namespaces = cache.namespaces().len(),
            "resilience core ready"
        );

        Ok(Self {
            breakers: Arc::new(CircuitBreakerRegistry::new(config.breaker)),
            limiter: Arc::new(limiter),
            cache: Arc::new(cache),
            tx_defaults: config.transactions.clone(),
            tx_counters: Arc::new(TxCounters::default()),
        })
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &CacheManager<Value> {
        &self.cache
    }

    pub(crate) fn shared_limiter(&self) -> Arc<SlidingWindowLimiter> {
        Arc::clone(&self.limiter)
    }

    pub(crate) fn shared_cache(&self) -> Arc<CacheManager<Value>> {
        Arc::clone(&self.cache)
    }

    /// Configured transaction defaults under a call-specific name.
    pub fn tx_options(&self, name: &str) -> TxOptions {
        TxOptions {
            name: name.to_string(),
            ..self.tx_defaults.clone()
        }
    }

    /// A runner over `store` whose reports feed this core's health totals.
    pub fn transactions<S: TransactionalStore>(&self, store: S) -> TransactionRunner<S> {
        let metrics: Arc<dyn TransactionMetrics> = Arc::clone(&self.tx_counters) as _;
        TransactionRunner::new(store).with_metrics(metrics)
    }

    /// Rate-limit `identifier` on `limiter`, then run `op` behind the breaker
    /// for `operation`.
    pub async fn guarded<T, E, F, Fut>(
        &self,
        identifier: &str,
        limiter: &str,
        operation: &str,
        op: F,
        options: &CallOptions,
    ) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let decision = self.limiter.check_named(identifier, limiter)?;
        if !decision.allowed {
            return Err(GuardError::RateLimited {
                limiter: limiter.to_string(),
                identifier: identifier.to_string(),
                retry_after: decision.retry_after(),
            });
        }

        Ok(self.breakers.execute(operation, op, options).await?)
    }

    /// Memoize a breaker-guarded fetch: concurrent misses for `key` share a
    /// single guarded call, and only successes are cached.
    pub async fn cached<E, F, Fut>(
        &self,
        namespace: &str,
        key: &str,
        operation: &str,
        op: F,
    ) -> Result<Value, GetOrSetError<BreakerError<E>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        let breakers = &self.breakers;
        self.cache
            .get_or_set(
                namespace,
                key,
                || async move {
                    breakers
                        .execute(operation, op, &CallOptions::default())
                        .await
                },
                None,
            )
            .await
    }

    /// Snapshot of every breaker, limiter, namespace and the transaction totals.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            healthy: self.breakers.is_healthy(),
            open_circuits: self.breakers.open_circuits(),
            circuits: self.breakers.all_stats(),
            rate_limits: self.limiter.stats(None),
            cache: self.cache.stats(None).unwrap_or_default(),
            transactions: self.tx_counters.totals(),
        }
    }
}
