//! Backoff strategies for the retry executor.
//!
//! Attempt semantics: attempt index `0` represents the initial call (no
//! delay), and retries start at `attempt = 1`, so the first retry waits
//! exactly the configured base delay. Exponential growth uses a configurable
//! factor (default 2) with an optional cap. Delays saturate at a documented
//! maximum to avoid overflow.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use vendra_resilience::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(1000))
//!     .with_max(Duration::from_secs(10))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::from_millis(0)); // initial call
//! assert_eq!(backoff.delay(1), Duration::from_millis(1000));
//! assert_eq!(backoff.delay(2), Duration::from_millis(2000));
//! assert_eq!(backoff.delay(6), Duration::from_secs(10)); // capped
//! ```

use std::fmt;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffError {
    /// `with_max`/`with_factor` only apply to exponential backoff.
    ConstantDoesNotSupportOption,
    /// The cap must be greater than zero.
    MaxMustBePositive,
    /// The cap must not be smaller than the base delay.
    MaxLessThanBase {
        /// Configured base delay.
        base: Duration,
        /// Rejected cap.
        max: Duration,
    },
    /// Growth factor must be strictly greater than 1.
    FactorTooSmall(f64),
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::ConstantDoesNotSupportOption => {
                write!(f, "with_max/with_factor are only valid for exponential backoff")
            }
            BackoffError::MaxMustBePositive => write!(f, "max must be greater than zero"),
            BackoffError::MaxLessThanBase { base, max } => {
                write!(f, "max ({:?}) must be >= base ({:?})", max, base)
            }
            BackoffError::FactorTooSmall(factor) => {
                write!(f, "backoff factor must be > 1 (got {})", factor)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

#[derive(Debug, Clone, PartialEq)]
struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            Duration::from_millis(0)
        } else {
            self.delay.min(MAX_BACKOFF)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ExponentialBackoff {
    base: Duration,
    factor: f64,
    max: Option<Duration>,
}

impl ExponentialBackoff {
    fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }
        // First retry (attempt = 1) uses the base delay exactly.
        let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let secs = self.base.as_secs_f64() * self.factor.powi(exponent);
        let raw = if secs.is_finite() {
            Duration::try_from_secs_f64(secs).unwrap_or(MAX_BACKOFF)
        } else {
            MAX_BACKOFF
        };
        let capped = self.max.map(|m| raw.min(m)).unwrap_or(raw);
        capped.min(MAX_BACKOFF)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BackoffKind {
    Constant(ConstantBackoff),
    Exponential(ExponentialBackoff),
}

/// Backoff strategy: constant per-retry delay, or exponential growth with a
/// configurable factor and optional cap.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    /// Create a constant backoff strategy.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant(ConstantBackoff { delay }) }
    }

    /// Create an exponential backoff strategy with factor 2 and no cap.
    pub fn exponential(base: Duration) -> Self {
        Self { kind: BackoffKind::Exponential(ExponentialBackoff { base, factor: 2.0, max: None }) }
    }

    /// Set the growth factor for exponential backoff; must be > 1.
    pub fn with_factor(mut self, factor: f64) -> Result<Self, BackoffError> {
        if !factor.is_finite() || factor <= 1.0 {
            return Err(BackoffError::FactorTooSmall(factor));
        }
        match &mut self.kind {
            BackoffKind::Exponential(exp) => {
                exp.factor = factor;
                Ok(self)
            }
            BackoffKind::Constant(_) => Err(BackoffError::ConstantDoesNotSupportOption),
        }
    }

    /// Set a maximum delay for exponential backoff.
    /// Returns an error if called on `constant`, if `max` is zero, or if `max < base`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Exponential(exp) => {
                if max < exp.base {
                    return Err(BackoffError::MaxLessThanBase { base: exp.base, max });
                }
                exp.max = Some(max);
                Ok(self)
            }
            BackoffKind::Constant(_) => Err(BackoffError::ConstantDoesNotSupportOption),
        }
    }

    /// Calculate the delay for a given attempt number (0-based; 0 = initial call, no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        match &self.kind {
            BackoffKind::Constant(c) => c.delay(attempt),
            BackoffKind::Exponential(e) => e.delay(attempt),
        }
    }
}
