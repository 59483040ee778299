//! AVCore Resilience
//!
//! Two guards that sit in front of every device and service call the control
//! layer makes:
//!
//! - **Circuit breakers** - one per operation name. A matrix switcher that stops
//!   answering gets cut off after a few consecutive failures instead of tying up
//!   every caller until its TCP timeout fires. After a cool-down a single trial
//!   call decides whether it is back.
//! - **Rate limiting** - sliding windows per `(identifier, limiter)` pair. Keeps
//!   a chatty panel from hammering a DSP, and keeps login attempts honest.
//!
//! Both are plain in-memory structures meant to be shared behind an `Arc` and
//! used from many tasks at once. Time comes from `tokio::time::Instant`, so
//! tests can pause and advance the clock.
//!
//! ## Quick example
//!
//! ```no_run
//! use resilience::{CallOptions, CircuitBreakerRegistry, SlidingWindowLimiter, presets};
//!
//! #[tokio::main]
//! async fn main() {
//!     let breakers = CircuitBreakerRegistry::default();
//!     let limiter = SlidingWindowLimiter::new();
//!
//!     if limiter.check("panel-3", "hardware", &presets::hardware()).allowed {
//!         let _ = breakers
//!             .execute(
//!                 "matrix.route",
//!                 || async { Ok::<_, std::io::Error>("routed") },
//!                 &CallOptions::default(),
//!             )
//!             .await;
//!     }
//! }
//! ```

mod circuit_breaker;
mod error;
mod latency;
mod rate_limit;
pub mod serde_millis;

pub use circuit_breaker::{
    CallOptions, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    CircuitStats,
};
pub use error::{BreakerError, RateLimitError};
pub use latency::{LatencySummary, LatencyWindow};
pub use rate_limit::{
    presets, RateLimitConfig, RateLimitDecision, RateLimitStats, SlidingWindowLimiter,
};
