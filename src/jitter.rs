//! Jitter strategies to prevent thundering herd.
//!
//! When to use which strategy:
//! - `None`: deterministic retries for tests or tightly controlled workflows.
//! - `Full`: uniform in `[0, delay]`, replaces the delay entirely.
//! - `Proportional`: keeps the computed delay and adds a uniform random extra
//!   in `[0, fraction * delay]`, so backoff spacing stays predictable while
//!   concurrent callers still spread out. The executor default is
//!   `Jitter::proportional(0.1)`.
//!
//! Notes:
//! - RNG: uses `rand`'s thread-local RNG by default; deterministic RNGs can
//!   be injected via `apply_with_rng`.
//! - Precision: millisecond conversions saturate to `u64::MAX` to avoid
//!   panics on very large durations.

use rand::{rng, Rng};
use std::time::Duration;

/// Jitter strategy for randomizing retry delays.
#[derive(Debug, Clone, PartialEq)]
pub enum Jitter {
    /// No jitter - use exact backoff delay.
    None,
    /// Full jitter: random between 0 and delay.
    Full,
    /// Proportional jitter: delay plus random extra in `[0, fraction * delay]`.
    Proportional {
        /// Fraction of the delay used as the jitter window; in `(0, 1]`.
        fraction: f64,
    },
}

impl Jitter {
    /// Create a full jitter strategy.
    pub fn full() -> Self {
        Jitter::Full
    }

    /// Create a proportional jitter strategy; `fraction` must be in `(0, 1]`.
    pub fn proportional(fraction: f64) -> Result<Self, &'static str> {
        if fraction.is_nan() || fraction <= 0.0 || fraction > 1.0 {
            return Err("proportional jitter: fraction must be in (0, 1]");
        }
        Ok(Jitter::Proportional { fraction })
    }

    /// Apply jitter to a delay duration.
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rng();
        self.apply_internal(delay, &mut rng)
    }

    /// Apply jitter with a custom RNG (for testing).
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        self.apply_internal(delay, rng)
    }

    fn as_millis_saturated(duration: Duration) -> u64 {
        duration.as_millis().try_into().unwrap_or(u64::MAX)
    }

    fn apply_internal<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Full => {
                let millis = Self::as_millis_saturated(delay);
                if millis == 0 {
                    return Duration::from_millis(0);
                }
                let jittered = rng.random_range(0..=millis);
                Duration::from_millis(jittered)
            }
            Jitter::Proportional { fraction } => {
                let millis = Self::as_millis_saturated(delay);
                let window = (millis as f64 * fraction) as u64;
                if window == 0 {
                    return delay;
                }
                let extra = rng.random_range(0..=window);
                delay.saturating_add(Duration::from_millis(extra))
            }
        }
    }
}
