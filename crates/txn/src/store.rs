//! The transactional execution primitive the wrapper drives.
//!
//! A store runs one unit of work inside a transaction and rolls it back when
//! the work returns `Err`. Schema and queries stay on the store's side; the
//! wrapper only sees the outcome.

use crate::classify::{classify_message, Classify, ErrorClass};
use crate::options::Isolation;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// A store that can run synchronous work atomically.
pub trait TransactionalStore: Send + Sync {
    /// What the unit of work gets to talk to (a connection, a staged map, ...).
    type Handle;
    type Error: Classify + std::fmt::Display;

    /// Run `work` in one transaction. Commit on `Ok`, roll back on `Err`.
    fn transaction<R, F>(&self, isolation: Isolation, work: F) -> Result<R, Self::Error>
    where
        F: FnOnce(&mut Self::Handle) -> Result<R, Self::Error>;
}

impl<S: TransactionalStore + ?Sized> TransactionalStore for std::sync::Arc<S> {
    type Handle = S::Handle;
    type Error = S::Error;

    fn transaction<R, F>(&self, isolation: Isolation, work: F) -> Result<R, Self::Error>
    where
        F: FnOnce(&mut Self::Handle) -> Result<R, Self::Error>,
    {
        (**self).transaction(isolation, work)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Another writer holds the lock.
    #[error("{0}")]
    Busy(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    /// Anything else the driver reports; classified by its text.
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn locked() -> Self {
        StoreError::Busy("database is locked".to_string())
    }
}

impl Classify for StoreError {
    fn classify(&self) -> ErrorClass {
        match self {
            StoreError::Busy(_) => ErrorClass::Retryable,
            StoreError::Constraint(_) => ErrorClass::Fatal,
            StoreError::Other(message) => classify_message(message),
        }
    }
}

/// Staged view of a [`MemoryStore`] inside one transaction.
#[derive(Debug)]
pub struct MemoryTxn {
    staged: BTreeMap<String, Vec<u8>>,
    isolation: Isolation,
}

impl MemoryTxn {
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.staged.get(key).map(Vec::as_slice)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.staged.insert(key.into(), value.into());
    }

    /// Insert only if `key` is absent; a duplicate is a constraint violation.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), StoreError> {
        let key = key.into();
        if self.staged.contains_key(&key) {
            return Err(StoreError::Constraint(format!("duplicate key {key}")));
        }
        self.staged.insert(key, value.into());
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.staged.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.staged.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn isolation(&self) -> Isolation {
        self.isolation
    }
}

/// In-memory key/value store with all-or-nothing commits.
///
/// Work runs against a staged copy; the copy replaces the committed map only
/// when the work succeeds. Transactions are serialized by one lock, which
/// makes every isolation level effectively exclusive.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
    busy_remaining: AtomicU32,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` transactions fail with a lock error before their
    /// work runs.
    pub fn inject_busy(&self, count: u32) {
        self.busy_remaining.store(count, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Committed value for `key`.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    fn take_busy(&self) -> bool {
        self.busy_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl TransactionalStore for MemoryStore {
    type Handle = MemoryTxn;
    type Error = StoreError;

    fn transaction<R, F>(&self, isolation: Isolation, work: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut MemoryTxn) -> Result<R, StoreError>,
    {
        if self.take_busy() {
            return Err(StoreError::locked());
        }

        let mut data = self.lock();
        let mut txn = MemoryTxn {
            staged: data.clone(),
            isolation,
        };

        match work(&mut txn) {
            Ok(value) => {
                *data = txn.staged;
                self.commits.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(err) => {
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(%isolation, error = %err, "memory store rolled back");
                Err(err)
            }
        }
    }
}
