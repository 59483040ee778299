//! Workspace umbrella crate for the AVCore resilience and caching layer.
//!
//! Device drivers, AI backends and the control API all talk to things that
//! fail: projectors that stop answering, upstream APIs that throttle, a
//! SQLite file that is briefly locked. This crate wires the member crates
//! into one [`Core`] handle so callers get circuit breaking, rate limiting,
//! retried transactions and TTL caching from a single configuration.
//!
//! - [`resilience`]: per-operation circuit breakers and sliding-window limits
//! - [`txn`]: transactional work with retry on transient lock errors
//! - [`cache`]: namespaced LRU caches with TTL and single-flight fills
//!
//! ```no_run
//! use avcore::{Core, CoreConfig, CallOptions};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let core = Core::from_config(&CoreConfig::load()?)?;
//! let power = core
//!     .guarded("panel-1", "hardware", "projector.power", || async {
//!         Ok::<_, std::io::Error>("on")
//!     }, &CallOptions::default())
//!     .await?;
//! assert_eq!(power, "on");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
mod handle;
mod health;
mod janitor;
pub mod telemetry;

pub use cache;
pub use resilience;
pub use txn;

pub use crate::config::{CacheSection, ConfigError, CoreConfig, JanitorConfig, LoggingConfig};
pub use crate::handle::Core;
pub use crate::error::{CoreError, GuardError};
pub use crate::health::HealthReport;
pub use crate::janitor::{spawn_janitor, JanitorHandle};
pub use crate::telemetry::init_tracing;

pub use cache::{CacheManager, GetOrSetError, NamespaceConfig};
pub use resilience::{
    BreakerError, CallOptions, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    RateLimitConfig, RateLimitDecision, SlidingWindowLimiter,
};
pub use txn::{Isolation, TransactionRunner, TransactionalStore, TxError, TxOptions};
