//! Circuit breaker with lock-free atomics.
//!
//! One breaker instance guards one logical downstream dependency. Clones
//! share the same underlying state via `Arc`, so every handle observes and
//! affects the same circuit lifecycle. Construct the breaker explicitly and
//! pass it by handle; there is no ambient global instance.
//!
//! State machine:
//! - `Closed` (initial): calls pass through. Any success resets the
//!   consecutive-failure count to 0; reaching `failure_threshold` failures
//!   opens the circuit.
//! - `Open`: calls are rejected with `CallError::CircuitOpen` without
//!   invoking the operation. Once `recovery_timeout` has elapsed, the next
//!   call transitions the circuit to half-open and runs as the probe.
//! - `HalfOpen`: up to `half_open_max_calls` probes run (default 1). A probe
//!   success closes the circuit and resets counters; a probe failure reopens
//!   it regardless of the threshold and restarts the timeout window.
//!
//! Concurrent callers may interleave their observations of the counters; the
//! breaker is a statistical safety valve, not a linearizable ledger.

use crate::{clock::Clock, clock::MonotonicClock, CallError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Default consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: usize = 5;
/// Default cooldown before half-open probing.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operating mode.
    Closed,
    /// Short-circuits calls until the recovery timeout elapses.
    Open,
    /// Probe mode allowing a limited number of calls to test recovery.
    HalfOpen,
}

impl CircuitState {
    fn to_u8(self) -> u8 {
        match self {
            CircuitState::Closed => STATE_CLOSED,
            CircuitState::Open => STATE_OPEN,
            CircuitState::HalfOpen => STATE_HALF_OPEN,
        }
    }

    fn from_u8(v: u8) -> Option<CircuitState> {
        match v {
            STATE_CLOSED => Some(CircuitState::Closed),
            STATE_OPEN => Some(CircuitState::Open),
            STATE_HALF_OPEN => Some(CircuitState::HalfOpen),
            _ => None,
        }
    }
}

/// Validated configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    failure_threshold: usize,
    recovery_timeout: Duration,
    half_open_max_calls: usize,
}

/// Errors produced when validating breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerError {
    /// Failure threshold must be > 0.
    InvalidFailureThreshold {
        /// Value provided by caller.
        provided: usize,
    },
    /// Recovery timeout must be > 0 unless the breaker is disabled.
    InvalidRecoveryTimeout(Duration),
    /// Half-open probe limit must be > 0.
    InvalidHalfOpenLimit {
        /// Value provided by caller.
        provided: usize,
    },
}

impl std::fmt::Display for CircuitBreakerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::InvalidFailureThreshold { provided } => {
                write!(f, "failure_threshold must be > 0 (got {})", provided)
            }
            CircuitBreakerError::InvalidRecoveryTimeout(timeout) => write!(
                f,
                "recovery_timeout must be > 0 unless breaker is disabled (got {:?})",
                timeout
            ),
            CircuitBreakerError::InvalidHalfOpenLimit { provided } => {
                write!(f, "half_open_max_calls must be > 0 (got {})", provided)
            }
        }
    }
}

impl std::error::Error for CircuitBreakerError {}

impl CircuitBreakerConfig {
    /// Create a config with validation.
    pub fn new(
        failure_threshold: usize,
        recovery_timeout: Duration,
        half_open_max_calls: usize,
    ) -> Result<Self, CircuitBreakerError> {
        let cfg = Self { failure_threshold, recovery_timeout, half_open_max_calls };
        cfg.validate()?;
        Ok(cfg)
    }

    /// A breaker that never opens. Uses `usize::MAX` thresholds and
    /// `Duration::MAX` timeout to disable all circuit-breaking logic.
    pub fn disabled() -> Self {
        Self {
            failure_threshold: usize::MAX,
            recovery_timeout: Duration::MAX,
            half_open_max_calls: usize::MAX,
        }
    }

    /// Threshold of consecutive failures before opening from `Closed`.
    pub fn failure_threshold(&self) -> usize {
        self.failure_threshold
    }

    /// Duration to stay `Open` before half-open probes.
    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }

    /// Maximum concurrent probe calls while `HalfOpen`.
    pub fn half_open_max_calls(&self) -> usize {
        self.half_open_max_calls
    }

    fn validate(&self) -> Result<(), CircuitBreakerError> {
        if self.failure_threshold == 0 {
            return Err(CircuitBreakerError::InvalidFailureThreshold { provided: 0 });
        }
        if self.half_open_max_calls == 0 {
            return Err(CircuitBreakerError::InvalidHalfOpenLimit { provided: 0 });
        }
        let disabled = self.failure_threshold == usize::MAX;
        if self.recovery_timeout == Duration::ZERO && !disabled {
            return Err(CircuitBreakerError::InvalidRecoveryTimeout(self.recovery_timeout));
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            half_open_max_calls: 1,
        }
    }
}

#[derive(Debug)]
struct BreakerShared {
    state: AtomicU8,
    failure_count: AtomicUsize,
    opened_at_millis: AtomicU64,
    half_open_calls: AtomicUsize,
}

impl BreakerShared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed.to_u8()),
            failure_count: AtomicUsize::new(0),
            opened_at_millis: AtomicU64::new(0),
            half_open_calls: AtomicUsize::new(0),
        }
    }
}

/// Releases a half-open probe slot even if the probe panics or is abandoned.
struct ProbeSlot {
    shared: Arc<BreakerShared>,
}

impl Drop for ProbeSlot {
    fn drop(&mut self) {
        self.shared.half_open_calls.fetch_sub(1, Ordering::Release);
    }
}

/// Circuit breaker guarding calls to one logical dependency.
///
/// Clones share the same underlying state via `Arc`, so all handles observe
/// and affect the same circuit lifecycle (failure counts, open/half-open/
/// closed transitions).
#[derive(Debug, Clone)]
pub struct CircuitBreakerPolicy {
    shared: Arc<BreakerShared>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self::from_config(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerPolicy {
    /// Create a circuit breaker, validating thresholds and timeouts.
    ///
    /// Errors if `failure_threshold == 0` or `recovery_timeout` is zero for
    /// an enabled breaker. The half-open probe limit defaults to 1.
    ///
    /// # Examples
    /// ```
    /// use vendra_resilience::CircuitBreakerPolicy;
    /// use std::time::Duration;
    /// let breaker = CircuitBreakerPolicy::new(5, Duration::from_secs(30)).unwrap();
    /// ```
    pub fn new(
        failure_threshold: usize,
        recovery_timeout: Duration,
    ) -> Result<Self, CircuitBreakerError> {
        let config =
            CircuitBreakerConfig::new(failure_threshold, recovery_timeout, 1)?;
        Ok(Self::from_config(config))
    }

    /// Create a breaker from an explicit config, validating the values.
    pub fn with_config(config: CircuitBreakerConfig) -> Result<Self, CircuitBreakerError> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Override the maximum number of half-open probe calls; must be > 0.
    pub fn with_half_open_limit(mut self, limit: usize) -> Result<Self, CircuitBreakerError> {
        if limit == 0 {
            return Err(CircuitBreakerError::InvalidHalfOpenLimit { provided: limit });
        }
        self.config.half_open_max_calls = limit;
        Ok(self)
    }

    fn from_config(config: CircuitBreakerConfig) -> Self {
        Self {
            shared: Arc::new(BreakerShared::new()),
            config,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Current state, as last observed.
    pub fn current_state(&self) -> CircuitState {
        CircuitState::from_u8(self.shared.state.load(Ordering::Acquire))
            .unwrap_or(CircuitState::Closed)
    }

    /// Consecutive failures recorded so far.
    pub fn failure_count(&self) -> usize {
        self.shared.failure_count.load(Ordering::Acquire)
    }

    /// Executes the provided async operation under circuit breaker protection.
    ///
    /// # Errors
    /// Returns `CallError::CircuitOpen` if the circuit is open (side-effect
    /// free; the operation is never invoked) or half-open capacity is
    /// exceeded. Returns `CallError::Inner(E)` if the operation itself fails.
    pub async fn execute<T, E, Fut, Op>(&self, operation: Op) -> Result<T, CallError<E>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CallError<E>>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        let probe = self.admit()?;

        let result = operation().await;
        drop(probe);

        match &result {
            Ok(_) => self.on_success(),
            Err(_) => self.on_failure(),
        }

        result
    }

    /// Decide whether a call may proceed; returns a probe slot to release if
    /// the call was admitted in the half-open state.
    fn admit<E>(&self) -> Result<Option<ProbeSlot>, CallError<E>> {
        loop {
            let current = CircuitState::from_u8(self.shared.state.load(Ordering::Acquire))
                .unwrap_or(CircuitState::Closed);

            match current {
                CircuitState::Closed => return Ok(None),
                CircuitState::Open => {
                    let opened_at = self.shared.opened_at_millis.load(Ordering::Acquire);
                    let elapsed = self.now_millis().saturating_sub(opened_at);

                    if elapsed < self.config.recovery_timeout.as_millis() as u64 {
                        return Err(self.rejection(elapsed));
                    }

                    // Cooldown elapsed: race to become the probe.
                    match self.shared.state.compare_exchange(
                        STATE_OPEN,
                        STATE_HALF_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            tracing::info!("circuit breaker → half-open");
                            self.shared.half_open_calls.store(1, Ordering::Release);
                            return Ok(Some(ProbeSlot { shared: self.shared.clone() }));
                        }
                        // Another caller moved the state; re-evaluate.
                        Err(_) => continue,
                    }
                }
                CircuitState::HalfOpen => {
                    let in_flight = self.shared.half_open_calls.fetch_add(1, Ordering::AcqRel);
                    if in_flight >= self.config.half_open_max_calls {
                        self.shared.half_open_calls.fetch_sub(1, Ordering::Release);
                        let opened_at = self.shared.opened_at_millis.load(Ordering::Acquire);
                        let elapsed = self.now_millis().saturating_sub(opened_at);
                        return Err(self.rejection(elapsed));
                    }
                    tracing::debug!(
                        in_flight = in_flight + 1,
                        max = self.config.half_open_max_calls,
                        "circuit breaker: half-open probe admitted"
                    );
                    return Ok(Some(ProbeSlot { shared: self.shared.clone() }));
                }
            }
        }
    }

    fn rejection<E>(&self, elapsed_millis: u64) -> CallError<E> {
        CallError::CircuitOpen {
            failure_count: self.shared.failure_count.load(Ordering::Acquire),
            open_for: Duration::from_millis(elapsed_millis),
        }
    }

    /// Any success resets the consecutive-failure counter to 0, so only an
    /// unbroken failure streak can trip the breaker.
    fn on_success(&self) {
        let current = self.current_state();

        match current {
            CircuitState::HalfOpen => {
                if self
                    .shared
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_CLOSED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.shared.half_open_calls.store(0, Ordering::Release);
                    self.shared.failure_count.store(0, Ordering::Release);
                    self.shared.opened_at_millis.store(0, Ordering::Release);
                    tracing::info!("circuit breaker → closed");
                }
            }
            CircuitState::Closed => {
                self.shared.failure_count.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let current = self.current_state();
        let failures = self.shared.failure_count.fetch_add(1, Ordering::AcqRel) + 1;

        match current {
            CircuitState::HalfOpen => {
                // A probe failure reopens regardless of the threshold.
                if self
                    .shared
                    .state
                    .compare_exchange(
                        STATE_HALF_OPEN,
                        STATE_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.shared.half_open_calls.store(0, Ordering::Release);
                    self.shared.opened_at_millis.store(self.now_millis(), Ordering::Release);
                    tracing::warn!(failures, "circuit breaker: probe failed → open");
                }
            }
            CircuitState::Closed => {
                if failures >= self.config.failure_threshold
                    && self
                        .shared
                        .state
                        .compare_exchange(
                            STATE_CLOSED,
                            STATE_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    self.shared.half_open_calls.store(0, Ordering::Release);
                    self.shared.opened_at_millis.store(self.now_millis(), Ordering::Release);
                    tracing::error!(
                        failures,
                        threshold = self.config.failure_threshold,
                        "circuit breaker → open"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }
}
