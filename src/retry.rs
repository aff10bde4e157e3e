//! Retry policy for fallible async operations.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries).
//! - Only `CallError::Inner(E)` values are eligible for retry; `CircuitOpen`
//!   rejections return immediately.
//! - `should_retry` predicate decides whether an `Inner` error is retryable.
//! - Backoff calculates the delay per retry; jitter randomizes it to avoid
//!   thundering herds.
//! - `on_retry` fires once per scheduled retry, before the delay, with the
//!   1-based ordinal of the attempt that just failed. Observability only; it
//!   has no effect on control flow.
//! - Sleeper controls how delays are applied (production uses `TokioSleeper`;
//!   tests can inject `InstantSleeper`/`TrackingSleeper`).
//!
//! Invariants:
//! - Attempts never exceed `max_attempts` and run strictly sequentially.
//! - On exhaustion the error from the final attempt is returned unchanged.
//! - Backoff/jitter/`on_retry` are invoked exactly attempts-1 times.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use vendra_resilience::{Backoff, CallError, Jitter, RetryPolicy};
//!
//! #[derive(Debug)]
//! struct MyErr;
//! impl std::fmt::Display for MyErr { fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "oops") } }
//! impl std::error::Error for MyErr {}
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<MyErr>::builder()
//!     .max_attempts(3) // total attempts
//!     .backoff(Backoff::exponential(Duration::from_millis(100)))
//!     .should_retry(|_e| true)
//!     .build()
//!     .unwrap();
//! let result: Result<(), CallError<MyErr>> =
//!     policy.execute(|| async { Err(CallError::Inner(MyErr)) }).await;
//! assert!(result.is_err());
//! # });
//! ```

use crate::{Backoff, CallError, Jitter, Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default total attempts per logical call.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
/// Default base delay for the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Default cap on the per-retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);
/// Default fraction of the delay used as the jitter window.
pub const DEFAULT_JITTER_FRACTION: f64 = 0.1;

/// Retry policy combining backoff, jitter, predicate, observer hook, and sleeper.
pub struct RetryPolicy<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    on_retry: Arc<dyn Fn(usize, &E) + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff.clone(),
            jitter: self.jitter.clone(),
            should_retry: self.should_retry.clone(),
            on_retry: self.on_retry.clone(),
            sleeper: self.sleeper.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("should_retry", &"<predicate>")
            .field("on_retry", &"<hook>")
            .field("sleeper", &"<sleeper>")
            .finish()
    }
}

impl<E> RetryPolicy<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Execute an async operation with retry semantics.
    ///
    /// Returns the first successful result; otherwise the error from the
    /// final attempt, unchanged.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, CallError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, CallError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(CallError::Inner(e)) => {
                    if !(self.should_retry)(&e) {
                        return Err(CallError::Inner(e));
                    }

                    // Last attempt: propagate the final error as-is, no delay.
                    if attempt >= self.max_attempts {
                        return Err(CallError::Inner(e));
                    }

                    // Retry index is 1-based, so the first retry waits the base delay.
                    let delay = self.jitter.apply(self.backoff.delay(attempt));
                    (self.on_retry)(attempt, &e);
                    self.sleeper.sleep(delay).await;
                }
                // Circuit-open rejections are not retried
                Err(e) => return Err(e),
            }
        }

        // The loop always returns: each iteration either succeeds, propagates,
        // or sleeps and continues, and the final iteration always propagates.
        debug_assert!(self.max_attempts > 0, "builder validates max_attempts > 0");
        unreachable!("retry loop exited without returning")
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    on_retry: Arc<dyn Fn(usize, &E) + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    InvalidMaxAttempts(usize),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::InvalidMaxAttempts(n) => {
                write!(f, "max_attempts must be > 0 (got {})", n)
            }
        }
    }
}

impl std::error::Error for BuildError {}

impl<E> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Create a builder with the documented defaults: 3 attempts, exponential
    /// backoff from 1s capped at 10s, 10% proportional jitter, retry
    /// everything.
    pub fn new() -> Self {
        let backoff = Backoff::exponential(DEFAULT_BASE_DELAY)
            .with_max(DEFAULT_MAX_DELAY)
            .expect("default backoff config is valid");
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff,
            jitter: Jitter::Proportional { fraction: DEFAULT_JITTER_FRACTION },
            should_retry: Arc::new(|_| true),
            on_retry: Arc::new(|_, _| {}),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set backoff strategy.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set jitter strategy.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Predicate to decide if an `Inner` error is retryable.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Observer called before each scheduled retry with the 1-based ordinal
    /// of the attempt that just failed and its error.
    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, &E) + Send + Sync + 'static,
    {
        self.on_retry = Arc::new(hook);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy<E>, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry,
            on_retry: self.on_retry,
            sleeper: self.sleeper,
        })
    }
}

impl<E> Default for RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstantSleeper, TrackingSleeper};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    impl std::error::Error for TestError {}

    #[tokio::test]
    async fn success_first_attempt_executes_once() {
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .backoff(Backoff::constant(Duration::from_millis(100)))
            .with_sleeper(InstantSleeper)
            .build()
            .expect("builder");

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, CallError<TestError>>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Should only execute once");
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds() {
        let retries = Arc::new(AtomicUsize::new(0));
        let retries_clone = retries.clone();
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .backoff(Backoff::constant(Duration::from_millis(10)))
            .with_sleeper(InstantSleeper)
            .on_retry(move |_, _| {
                retries_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .expect("builder");

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(CallError::Inner(TestError(format!("attempt {}", attempt))))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3, "Should succeed on 3rd attempt");
        assert_eq!(retries.load(Ordering::SeqCst), 2, "on_retry fires once per retry");
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error_unchanged() {
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .backoff(Backoff::constant(Duration::from_millis(10)))
            .with_sleeper(InstantSleeper)
            .build()
            .expect("builder");

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CallError::Inner(TestError(format!("attempt {}", attempt))))
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 3, "Should attempt exactly 3 times");

        // The caller sees the final attempt's error, not a wrapper.
        match result.unwrap_err() {
            CallError::Inner(e) => assert_eq!(e.0, "attempt 2"),
            e => panic!("Expected Inner, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn exponential_delays_are_exact_without_jitter() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .backoff(
                Backoff::exponential(Duration::from_millis(1000))
                    .with_max(Duration::from_millis(10_000))
                    .expect("valid backoff"),
            )
            .with_jitter(Jitter::None)
            .with_sleeper(sleeper.clone())
            .build()
            .expect("builder");

        let _ = policy
            .execute(|| async { Err::<(), _>(CallError::Inner(TestError("fail".to_string()))) })
            .await;

        assert_eq!(sleeper.calls(), 2, "Should sleep twice (between 3 attempts)");
        assert_eq!(sleeper.call_at(0).unwrap(), Duration::from_millis(1000));
        assert_eq!(sleeper.call_at(1).unwrap(), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn delays_are_capped_at_max() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::builder()
            .max_attempts(6)
            .backoff(
                Backoff::exponential(Duration::from_millis(1000))
                    .with_max(Duration::from_millis(4000))
                    .expect("valid backoff"),
            )
            .with_jitter(Jitter::None)
            .with_sleeper(sleeper.clone())
            .build()
            .expect("builder");

        let _ = policy
            .execute(|| async { Err::<(), _>(CallError::Inner(TestError("fail".to_string()))) })
            .await;

        assert_eq!(sleeper.calls(), 5);
        assert_eq!(sleeper.call_at(2).unwrap(), Duration::from_millis(4000)); // 4000 exact
        assert_eq!(sleeper.call_at(3).unwrap(), Duration::from_millis(4000)); // capped
        assert_eq!(sleeper.call_at(4).unwrap(), Duration::from_millis(4000)); // capped
    }

    #[tokio::test]
    async fn proportional_jitter_stays_within_window() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .backoff(Backoff::constant(Duration::from_millis(1000)))
            .with_jitter(Jitter::proportional(0.1).expect("valid jitter"))
            .with_sleeper(sleeper.clone())
            .build()
            .expect("builder");

        let _ = policy
            .execute(|| async { Err::<(), _>(CallError::Inner(TestError("fail".to_string()))) })
            .await;

        assert_eq!(sleeper.calls(), 2);
        for idx in 0..sleeper.calls() {
            let call = sleeper.call_at(idx).unwrap();
            assert!(call >= Duration::from_millis(1000));
            assert!(call <= Duration::from_millis(1100));
        }
    }

    #[tokio::test]
    async fn non_retryable_error_propagates_immediately() {
        let retries = Arc::new(AtomicUsize::new(0));
        let retries_clone = retries.clone();
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .backoff(Backoff::constant(Duration::from_millis(10)))
            .with_sleeper(InstantSleeper)
            .should_retry(|e: &TestError| e.0.contains("transient"))
            .on_retry(move |_, _| {
                retries_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .expect("builder");

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CallError::Inner(TestError("permission denied".to_string())))
                }
            })
            .await;

        assert!(matches!(result, Err(CallError::Inner(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Should not retry non-retryable error");
        assert_eq!(retries.load(Ordering::SeqCst), 0, "on_retry never fires");
    }

    #[tokio::test]
    async fn retryable_error_goes_the_distance() {
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .backoff(Backoff::constant(Duration::from_millis(10)))
            .with_sleeper(InstantSleeper)
            .should_retry(|e: &TestError| e.0.contains("transient"))
            .build()
            .expect("builder");

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(CallError::Inner(TestError("transient glitch".to_string())))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_attempt_policy_never_retries() {
        let policy = RetryPolicy::builder()
            .max_attempts(1)
            .with_sleeper(InstantSleeper)
            .build()
            .expect("builder");

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CallError::Inner(TestError("fail".to_string())))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Should only attempt once");
    }

    #[tokio::test]
    async fn circuit_open_rejection_is_not_retried() {
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .backoff(Backoff::constant(Duration::from_millis(10)))
            .with_sleeper(InstantSleeper)
            .build()
            .expect("builder");

        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let result = policy
            .execute(|| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), CallError<TestError>>(CallError::CircuitOpen {
                        failure_count: 5,
                        open_for: Duration::from_secs(1),
                    })
                }
            })
            .await;

        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Should not retry breaker rejections");
    }

    #[tokio::test]
    async fn on_retry_receives_one_based_ordinals() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let policy = RetryPolicy::builder()
            .max_attempts(4)
            .backoff(Backoff::constant(Duration::from_millis(1)))
            .with_sleeper(InstantSleeper)
            .on_retry(move |attempt, e: &TestError| {
                seen_clone.lock().unwrap().push((attempt, e.0.clone()));
            })
            .build()
            .expect("builder");

        let _ = policy
            .execute(|| async { Err::<(), _>(CallError::Inner(TestError("boom".to_string()))) })
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[1].0, 2);
        assert_eq!(seen[2].0, 3);
    }

    #[tokio::test]
    async fn builder_rejects_zero_attempts() {
        let err = RetryPolicy::<TestError>::builder().max_attempts(0).build();
        assert!(matches!(err, Err(BuildError::InvalidMaxAttempts(0))));
    }
}
