use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-namespace counters for health and ops dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, 0.0 before any lookup.
    pub hit_rate: f64,
    /// Live entries.
    pub size: usize,
    pub capacity: usize,
    /// Live entries pushed out to make room.
    pub evictions: u64,
    /// Entries dropped because their TTL ran out.
    pub expirations: u64,
    #[serde(with = "crate::serde_millis")]
    pub ttl: Duration,
}

/// Metadata for one entry; never includes the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub key: String,
    #[serde(with = "crate::serde_millis")]
    pub age: Duration,
    /// Time since the last read.
    #[serde(with = "crate::serde_millis")]
    pub idle: Duration,
    #[serde(with = "crate::serde_millis")]
    pub ttl_remaining: Duration,
    pub hit_count: u64,
    pub expired: bool,
}
