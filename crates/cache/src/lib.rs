//! AVCore Cache
//!
//! Namespaced in-memory cache for the output of slow device and service calls.
//! Each namespace gets its own TTL and capacity; a full namespace reclaims an
//! expired entry if it has one and otherwise evicts its least recently read
//! entry.
//!
//! The usual pattern is to memoize a breaker-guarded fetch:
//!
//! ```no_run
//! use cache::{presets, CacheManager};
//!
//! # async fn poll_tv() -> Result<String, std::io::Error> { Ok("on".into()) }
//! # async fn demo() {
//! let cache: CacheManager<String> = CacheManager::with_presets();
//! let power = cache
//!     .get_or_set(presets::DEVICE_STATUS, "tv.lobby.power", poll_tv, None)
//!     .await;
//! # }
//! ```
//!
//! Concurrent `get_or_set` calls for the same key share one `poll_tv`.

mod config;
mod error;
mod manager;
mod namespace;
mod serde_millis;
mod stats;

pub use config::{presets, NamespaceConfig};
pub use error::{CacheError, GetOrSetError};
pub use manager::CacheManager;
pub use stats::{EntrySnapshot, NamespaceStats};
