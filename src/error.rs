//! Error type shared by the retry executor, circuit breaker, and call guard.
use std::fmt;
use std::time::Duration;

/// Unified error for guarded calls.
///
/// There are exactly two failure shapes: the breaker short-circuited the call
/// (`CircuitOpen`, the operation was never invoked), or the operation itself
/// failed (`Inner`). When retries are exhausted the error from the final
/// attempt is propagated as `Inner` unchanged, so callers see the same shape
/// whether the call failed on attempt 1 or attempt N.
#[derive(Debug, Clone)]
pub enum CallError<E> {
    /// The circuit breaker is open; the operation was not invoked.
    CircuitOpen {
        /// Consecutive failures recorded when the circuit opened.
        failure_count: usize,
        /// How long the circuit has been open.
        open_for: Duration,
    },
    /// The underlying operation failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CircuitOpen { failure_count, open_for } => {
                write!(
                    f,
                    "circuit breaker open ({} failures, open for {:?})",
                    failure_count, open_for
                )
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CallError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::CircuitOpen { .. } => None,
        }
    }
}

impl<E> CallError<E> {
    /// Check if this error is a circuit-breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this error wraps an operation error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// Extract the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    /// How long the circuit has been open, if this is a rejection.
    pub fn circuit_open_duration(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { open_for, .. } => Some(*open_for),
            _ => None,
        }
    }
}
