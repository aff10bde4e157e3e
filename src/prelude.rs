//! Convenient re-exports for common vendra-resilience types.
pub use crate::{
    backend::{BackendError, BackendErrorKind, RetryFilter},
    backoff::{Backoff, BackoffError, MAX_BACKOFF},
    circuit_breaker::{
        CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerPolicy, CircuitState,
    },
    error::CallError,
    guard::{CallGuard, CallGuardBuilder, GuardLayer},
    jitter::Jitter,
    retry::{BuildError, RetryPolicy, RetryPolicyBuilder},
};
