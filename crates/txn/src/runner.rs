//! Retry loop around [`TransactionalStore::transaction`].
//!
//! Each attempt is a full transaction. Transient lock errors roll back and
//! retry after a backoff; any other error rolls back and returns at once.
//!
//! The unit of work is a plain closure over `&mut S::Handle`, and its return
//! type may not borrow the handle. A future that uses the transaction
//! therefore fails to compile:
//!
//! ```compile_fail
//! use txn::{MemoryStore, TransactionRunner, TxOptions};
//!
//! let runner = TransactionRunner::new(MemoryStore::new());
//! let _ = runner.run(&TxOptions::named("zones.rename"), |txn| {
//!     Ok(async move { txn.put("zone.3", b"Patio".to_vec()) })
//! });
//! ```
//!
//! A future that never touches the handle is not rejected. It is returned to
//! the caller as an ordinary value after the transaction commits, and any
//! database work it does later runs outside the transaction.

use crate::classify::Classify;
use crate::error::TxError;
use crate::metrics::{TransactionMetrics, TxReport};
use crate::options::TxOptions;
use crate::store::TransactionalStore;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One statement of a [`TransactionRunner::run_batch`] call.
pub type BatchStep<'a, H, E> = Box<dyn FnMut(&mut H) -> Result<(), E> + Send + 'a>;

pub struct TransactionRunner<S> {
    store: S,
    metrics: Option<Arc<dyn TransactionMetrics>>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for TransactionRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionRunner")
            .field("store", &self.store)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

enum Next<E> {
    Retry(Duration),
    GiveUp(TxError<E>),
}

/// Attempt bookkeeping shared by the sync and async loops.
struct Attempts<'a> {
    options: &'a TxOptions,
    started: Instant,
    attempt: u32,
}

impl<'a> Attempts<'a> {
    fn start(options: &'a TxOptions) -> Self {
        Self {
            options,
            started: Instant::now(),
            attempt: 1,
        }
    }

    fn after_failure<E: Classify + Display>(&mut self, error: E) -> Next<E> {
        let name = &self.options.name;
        if !error.classify().is_retryable() {
            return Next::GiveUp(TxError::Fatal {
                name: name.clone(),
                attempts: self.attempt,
                error,
            });
        }

        if self.attempt > self.options.retries {
            return Next::GiveUp(TxError::Exhausted {
                name: name.clone(),
                attempts: self.attempt,
                error,
            });
        }

        let delay = self.options.delay_for(self.attempt);
        tracing::debug!(
            transaction = %name,
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "transient lock error, retrying"
        );
        self.attempt += 1;
        Next::Retry(delay)
    }

    fn report(&self, succeeded: bool) -> TxReport {
        TxReport {
            name: self.options.name.clone(),
            isolation: self.options.isolation,
            duration: self.started.elapsed(),
            retry_count: self.attempt - 1,
            succeeded,
        }
    }
}

impl<S> TransactionRunner<S>
where
    S: TransactionalStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            metrics: None,
        }
    }

    /// Deliver a [`TxReport`] for every finished call to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn TransactionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run `work` in a transaction, sleeping the current thread between
    /// attempts.
    ///
    /// Meant for blocking contexts (`spawn_blocking`, startup code). Inside a
    /// runtime prefer [`run_async`](Self::run_async).
    pub fn run<R, F>(&self, options: &TxOptions, mut work: F) -> Result<R, TxError<S::Error>>
    where
        F: FnMut(&mut S::Handle) -> Result<R, S::Error>,
    {
        let mut attempts = Attempts::start(options);
        loop {
            match self.store.transaction(options.isolation, &mut work) {
                Ok(value) => {
                    self.finish(attempts.report(true), None);
                    return Ok(value);
                }
                Err(error) => match attempts.after_failure(error) {
                    Next::Retry(delay) => {
                        if inside_runtime() {
                            tracing::warn!(
                                name = %options.name,
                                delay_ms = delay.as_millis() as u64,
                                "blocking retry wait on a tokio runtime thread, use run_async"
                            );
                        }
                        std::thread::sleep(delay)
                    }
                    Next::GiveUp(err) => {
                        self.finish(attempts.report(false), Some(&err));
                        return Err(err);
                    }
                },
            }
        }
    }

    /// Same as [`run`](Self::run) but waits on a tokio timer between
    /// attempts, so other tasks keep running.
    pub async fn run_async<R, F>(
        &self,
        options: &TxOptions,
        mut work: F,
    ) -> Result<R, TxError<S::Error>>
    where
        F: FnMut(&mut S::Handle) -> Result<R, S::Error>,
    {
        let mut attempts = Attempts::start(options);
        loop {
            match self.store.transaction(options.isolation, &mut work) {
                Ok(value) => {
                    self.finish(attempts.report(true), None);
                    return Ok(value);
                }
                Err(error) => match attempts.after_failure(error) {
                    Next::Retry(delay) => tokio::time::sleep(delay).await,
                    Next::GiveUp(err) => {
                        self.finish(attempts.report(false), Some(&err));
                        return Err(err);
                    }
                },
            }
        }
    }

    /// Run every step in order inside one transaction.
    ///
    /// A failing step rolls back the work of the steps before it; a retry
    /// replays the whole batch from the first step.
    pub fn run_batch(
        &self,
        options: &TxOptions,
        mut steps: Vec<BatchStep<'_, S::Handle, S::Error>>,
    ) -> Result<(), TxError<S::Error>> {
        self.run(options, |handle| run_steps(&mut steps, handle))
    }

    /// [`run_batch`](Self::run_batch) with non-blocking waits between attempts.
    pub async fn run_batch_async(
        &self,
        options: &TxOptions,
        mut steps: Vec<BatchStep<'_, S::Handle, S::Error>>,
    ) -> Result<(), TxError<S::Error>> {
        self.run_async(options, |handle| run_steps(&mut steps, handle))
            .await
    }

    fn finish(&self, report: TxReport, error: Option<&TxError<S::Error>>) {
        match error {
            None => tracing::debug!(
                transaction = %report.name,
                isolation = %report.isolation,
                duration_ms = report.duration.as_millis() as u64,
                retry_count = report.retry_count,
                "transaction committed"
            ),
            Some(err) => tracing::warn!(
                transaction = %report.name,
                isolation = %report.isolation,
                duration_ms = report.duration.as_millis() as u64,
                retry_count = report.retry_count,
                error = %err,
                "transaction rolled back"
            ),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_transaction(&report);
        }
    }
}

fn run_steps<H, E>(steps: &mut [BatchStep<'_, H, E>], handle: &mut H) -> Result<(), E> {
    for (index, step) in steps.iter_mut().enumerate() {
        if let Err(err) = step(handle) {
            tracing::trace!(step = index, "batch step failed");
            return Err(err);
        }
    }
    Ok(())
}

/// True when called from a thread driving a tokio runtime.
fn inside_runtime() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}
