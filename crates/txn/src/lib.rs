//! AVCore Transactions
//!
//! Wraps synchronous units of database work so transient lock contention
//! ("database is locked", `SQLITE_BUSY`, ...) is retried with backoff while
//! real errors come straight back. Every attempt runs in its own transaction
//! and is rolled back on error, so callers never see a partial commit.
//!
//! The store itself is injected through [`TransactionalStore`]. A
//! [`MemoryStore`] ships for tests and small embedded setups.
//!
//! ```
//! use txn::{MemoryStore, TransactionRunner, TxOptions};
//!
//! let runner = TransactionRunner::new(MemoryStore::new());
//! runner
//!     .run(&TxOptions::named("zones.rename"), |txn| {
//!         txn.put("zone.3", b"Patio".to_vec());
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(runner.store().get("zone.3").as_deref(), Some(&b"Patio"[..]));
//! ```

mod classify;
mod error;
mod metrics;
mod options;
mod runner;
mod serde_millis;
mod store;

pub use classify::{classify_message, Classify, ErrorClass};
pub use error::TxError;
pub use metrics::{TransactionMetrics, TxCounters, TxReport, TxTotals};
pub use options::{Backoff, Isolation, TxOptions};
pub use runner::{BatchStep, TransactionRunner};
pub use store::{MemoryStore, MemoryTxn, StoreError, TransactionalStore};
