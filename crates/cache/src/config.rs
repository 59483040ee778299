use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed TTL and capacity for one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Default lifetime of an entry, in milliseconds.
    #[serde(with = "crate::serde_millis")]
    pub ttl: Duration,
    pub max_entries: usize,
}

impl NamespaceConfig {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

/// Namespace shapes that cover most of the control layer.
pub mod presets {
    use super::NamespaceConfig;
    use std::time::Duration;

    pub const VOLATILE: &str = "volatile";
    pub const REFERENCE: &str = "reference";
    pub const DEVICE_STATUS: &str = "device_status";

    /// Fast-changing external data (scores, now-playing): 30s, 100 entries.
    pub fn volatile() -> NamespaceConfig {
        NamespaceConfig::new(Duration::from_secs(30), 100)
    }

    /// Mostly static lookups (channel maps, input names): 1h, 1000 entries.
    pub fn reference() -> NamespaceConfig {
        NamespaceConfig::new(Duration::from_secs(3600), 1000)
    }

    /// Polled device state: 5s, 500 entries.
    pub fn device_status() -> NamespaceConfig {
        NamespaceConfig::new(Duration::from_secs(5), 500)
    }

    pub fn all() -> [(&'static str, NamespaceConfig); 3] {
        [
            (VOLATILE, volatile()),
            (REFERENCE, reference()),
            (DEVICE_STATUS, device_status()),
        ]
    }
}
