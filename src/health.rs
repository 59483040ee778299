use cache::NamespaceStats;
use resilience::{CircuitStats, RateLimitStats};
use serde::{Deserialize, Serialize};
use txn::TxTotals;

/// Registry-wide health for ops dashboards.
///
/// `healthy` is false while any circuit is open. Rate limiting and cache
/// misses never make the core unhealthy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub open_circuits: Vec<String>,
    pub circuits: Vec<CircuitStats>,
    pub rate_limits: Vec<RateLimitStats>,
    pub cache: Vec<NamespaceStats>,
    pub transactions: TxTotals,
}

impl HealthReport {
    /// One-line summary for periodic logging.
    pub fn summary(&self) -> String {
        let rejected: u64 = self.rate_limits.iter().map(|s| s.rejected).sum();
        let hits: u64 = self.cache.iter().map(|s| s.hits).sum();
        let misses: u64 = self.cache.iter().map(|s| s.misses).sum();
        format!(
            "healthy={} circuits={} open={} rate_rejected={} cache_hits={} cache_misses={} tx_ok={} tx_failed={}",
            self.healthy,
            self.circuits.len(),
            self.open_circuits.len(),
            rejected,
            hits,
            misses,
            self.transactions.succeeded,
            self.transactions.failed,
        )
    }
}
