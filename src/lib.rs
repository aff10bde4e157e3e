#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # vendra-resilience
//!
//! Resilient call executor for the Vendra marketplace's backend calls:
//! bounded exponential-backoff retry plus a circuit breaker, composed so the
//! breaker gates the whole retry sequence and fast-fails during outages.
//!
//! ## Features
//!
//! - **Retry policies** with exponential backoff (configurable factor and
//!   cap) and proportional jitter
//! - **Circuit breakers** with half-open probe recovery, lock-free atomics
//! - **Call guards** composing both, one per logical dependency, with a
//!   `tracing`-based retry observer
//! - **Typed backend errors** so retry eligibility dispatches on a closed
//!   set of kinds instead of duck-typed code probing
//! - **Tower integration** via [`GuardLayer`]
//! - **Deterministic tests** through injectable clock, sleeper, and RNG seams
//!
//! ## Quick Start
//!
//! ```rust
//! use vendra_resilience::presets;
//! use vendra_resilience::BackendError;
//!
//! #[tokio::main]
//! async fn main() {
//!     let guard = presets::marketplace("listings");
//!
//!     let result = guard
//!         .execute(|| async {
//!             // Your backend call here
//!             Ok::<_, BackendError>("rows")
//!         })
//!         .await;
//!     assert_eq!(result.unwrap(), "rows");
//! }
//! ```

pub mod backend;
pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod guard;
pub mod jitter;
pub mod prelude;
pub mod presets;
pub mod retry;
pub mod sleeper;

// Re-exports
pub use backend::{BackendError, BackendErrorKind, RetryFilter};
pub use backoff::Backoff;
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerPolicy, CircuitState,
};
pub use clock::{Clock, MonotonicClock};
pub use error::CallError;
pub use guard::{CallGuard, CallGuardBuilder, GuardLayer, GuardService};
pub use jitter::Jitter;
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
