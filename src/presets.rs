//! Pre-wired guards for common call sites.
//!
//! These eliminate the need to hand-assemble a breaker, retry policy, and
//! filter at every call site, and pin down the defaults the application
//! actually runs with.
//!
//! ## Available presets
//!
//! - [`backend_call`]: general-purpose guard for a backend dependency
//!   (breaker 5 failures / 30s recovery, 3 attempts, exponential backoff).
//! - [`marketplace`]: the marketplace's own tighter defaults
//!   (breaker 3 failures / 15s recovery, same retry policy).
//!
//! Both exclude authentication/authorization failures and permanent client
//! errors from retry via [`RetryFilter::default`].
//!
//! # Example
//! ```rust
//! use vendra_resilience::presets;
//! use vendra_resilience::{BackendError, BackendErrorKind};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let guard = presets::marketplace("listings");
//! let result = guard
//!     .execute(|| async { Ok::<_, BackendError>("rows") })
//!     .await;
//! assert_eq!(result.unwrap(), "rows");
//! # });
//! ```

use crate::{BackendError, CallGuard, CircuitBreakerPolicy, RetryFilter};
use std::time::Duration;

const DEFAULT_FAILURE_THRESHOLD: usize = 5;
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_millis(30_000);

const MARKETPLACE_FAILURE_THRESHOLD: usize = 3;
const MARKETPLACE_RECOVERY_TIMEOUT: Duration = Duration::from_millis(15_000);

/// General-purpose guard for one backend dependency.
///
/// Breaker: opens after 5 consecutive logical-call failures, 30s recovery.
/// Retry: 3 attempts, exponential backoff 1s ×2 capped at 10s, 10%
/// proportional jitter, default [`RetryFilter`] classification.
pub fn backend_call(context: impl Into<String>) -> CallGuard<BackendError> {
    guard_with(
        context,
        DEFAULT_FAILURE_THRESHOLD,
        DEFAULT_RECOVERY_TIMEOUT,
        RetryFilter::default(),
    )
}

/// The marketplace's own defaults: a tighter breaker (3 failures, 15s
/// recovery) in front of the same retry policy as [`backend_call`].
pub fn marketplace(context: impl Into<String>) -> CallGuard<BackendError> {
    guard_with(
        context,
        MARKETPLACE_FAILURE_THRESHOLD,
        MARKETPLACE_RECOVERY_TIMEOUT,
        RetryFilter::default(),
    )
}

/// Build a guard with explicit breaker thresholds and a custom filter.
pub fn guard_with(
    context: impl Into<String>,
    failure_threshold: usize,
    recovery_timeout: Duration,
    filter: RetryFilter,
) -> CallGuard<BackendError> {
    let breaker = CircuitBreakerPolicy::new(failure_threshold, recovery_timeout)
        .expect("preset breaker config is valid");
    let predicate = filter.into_predicate();
    CallGuard::builder(context)
        .breaker(breaker)
        .should_retry(predicate)
        .build()
}
