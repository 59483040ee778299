//! Per-call transaction reports and a simple aggregate observer.

use crate::options::Isolation;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// What happened to one wrapped transaction, retries included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReport {
    pub name: String,
    pub isolation: Isolation,
    #[serde(with = "crate::serde_millis")]
    pub duration: Duration,
    pub retry_count: u32,
    pub succeeded: bool,
}

/// Observer for finished transactions.
pub trait TransactionMetrics: Send + Sync {
    fn record_transaction(&self, report: &TxReport);
}

/// Running totals across every transaction a runner has finished.
#[derive(Debug, Default)]
pub struct TxCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxTotals {
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
}

impl TxCounters {
    pub fn totals(&self) -> TxTotals {
        TxTotals {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

impl TransactionMetrics for TxCounters {
    fn record_transaction(&self, report: &TxReport) {
        if report.succeeded {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.retries
            .fetch_add(u64::from(report.retry_count), Ordering::Relaxed);
    }
}
