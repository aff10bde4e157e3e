//! Guarded call executor: circuit breaker wrapped around a retry sequence.
//!
//! The breaker gates the *whole* retry sequence, so one logical call accounts
//! for exactly one breaker success or failure regardless of how many attempts
//! ran inside it, and an open circuit fast-fails before any attempt is made.
//!
//! Each guard is an explicitly constructed value naming its downstream
//! dependency via a context label; clones share breaker state, so handing
//! clones to concurrent callers keeps one circuit per dependency.
//!
//! Cancellation is by future drop: abandoning the returned future cancels the
//! in-flight attempt and any pending backoff sleep.
//!
//! Example
//! ```rust
//! use vendra_resilience::{CallError, CallGuard};
//!
//! # #[derive(Debug)]
//! # struct QueryError;
//! # impl std::fmt::Display for QueryError { fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "query failed") } }
//! # impl std::error::Error for QueryError {}
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let guard: CallGuard<QueryError> = CallGuard::builder("listings-db").build();
//! let result = guard.execute(|| async { Ok::<_, QueryError>(42) }).await;
//! assert_eq!(result.unwrap(), 42);
//! # });
//! ```

use crate::{CallError, CircuitBreakerPolicy, RetryPolicy};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tower_layer::Layer;
use tower_service::Service;

/// Combined retry + circuit breaker executor for one logical dependency.
pub struct CallGuard<E> {
    breaker: CircuitBreakerPolicy,
    retry: RetryPolicy<E>,
    context: Arc<str>,
}

impl<E> Clone for CallGuard<E> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            retry: self.retry.clone(),
            context: self.context.clone(),
        }
    }
}

impl<E> std::fmt::Debug for CallGuard<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallGuard")
            .field("context", &self.context)
            .field("breaker", &self.breaker)
            .field("retry", &self.retry)
            .finish()
    }
}

impl<E> CallGuard<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Start building a guard for the named dependency.
    pub fn builder(context: impl Into<String>) -> CallGuardBuilder<E> {
        CallGuardBuilder::new(context)
    }

    /// Label naming the guarded dependency.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Shared handle to the breaker guarding this dependency.
    pub fn breaker(&self) -> &CircuitBreakerPolicy {
        &self.breaker
    }

    /// Execute an operation with retry inside the circuit breaker.
    ///
    /// The operation returns its own error type; the guard classifies and
    /// wraps it. On success the first successful value is returned; on
    /// failure the caller sees either `CallError::CircuitOpen` (fast-fail,
    /// operation not invoked) or `CallError::Inner` carrying the error from
    /// the final attempt.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, CallError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, E>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        // Shared cell so the FnOnce breaker closure can hand the FnMut
        // operation to the retry loop.
        let op_cell = Arc::new(Mutex::new(operation));
        let retry = self.retry.clone();

        self.breaker
            .execute(|| {
                let op_cell = op_cell.clone();
                async move {
                    retry
                        .execute(|| {
                            let op_cell = op_cell.clone();
                            async move {
                                let fut = {
                                    let mut op = op_cell.lock().unwrap();
                                    op()
                                };
                                fut.await.map_err(CallError::Inner)
                            }
                        })
                        .await
                }
            })
            .await
    }
}

/// Builder for [`CallGuard`].
pub struct CallGuardBuilder<E> {
    context: String,
    breaker: Option<CircuitBreakerPolicy>,
    retry: Option<RetryPolicy<E>>,
    should_retry: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
}

impl<E> CallGuardBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn new(context: impl Into<String>) -> Self {
        Self { context: context.into(), breaker: None, retry: None, should_retry: None }
    }

    /// Use a specific breaker (to share one circuit across guards, or to
    /// change thresholds). Default: threshold 5, recovery 30s.
    pub fn breaker(mut self, breaker: CircuitBreakerPolicy) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Replace the whole retry policy, including its `on_retry` hook.
    pub fn retry(mut self, retry: RetryPolicy<E>) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the retry predicate on the default policy. Ignored when a full
    /// policy is supplied via [`Self::retry`].
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Build the guard. The default retry policy logs each scheduled retry at
    /// `warn` level tagged with the context label.
    pub fn build(self) -> CallGuard<E> {
        let context: Arc<str> = Arc::from(self.context);

        let retry = match self.retry {
            Some(policy) => policy,
            None => {
                let ctx = context.clone();
                let mut builder = RetryPolicy::builder().on_retry(move |attempt, error: &E| {
                    tracing::warn!(
                        context = %ctx,
                        attempt,
                        error = %error,
                        "retrying guarded call"
                    );
                });
                if let Some(predicate) = self.should_retry {
                    builder = builder.should_retry(move |e| predicate(e));
                }
                builder.build().expect("default retry config is valid")
            }
        };

        let breaker = self.breaker.unwrap_or_default();

        CallGuard { breaker, retry, context }
    }
}

/// Tower layer applying a [`CallGuard`] to a service.
pub struct GuardLayer<E> {
    guard: CallGuard<E>,
}

impl<E> GuardLayer<E> {
    /// Wrap services with the given guard; clones of the layer and of the
    /// produced services all share the guard's breaker state.
    pub fn new(guard: CallGuard<E>) -> Self {
        Self { guard }
    }
}

impl<E> Clone for GuardLayer<E> {
    fn clone(&self) -> Self {
        Self { guard: self.guard.clone() }
    }
}

impl<S, E> Layer<S> for GuardLayer<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    type Service = GuardService<S, E>;

    fn layer(&self, service: S) -> Self::Service {
        GuardService { inner: service, guard: self.guard.clone() }
    }
}

/// Guarded service produced by [`GuardLayer`].
pub struct GuardService<S, E> {
    inner: S,
    guard: CallGuard<E>,
}

impl<S: Clone, E> Clone for GuardService<S, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), guard: self.guard.clone() }
    }
}

impl<S, E, Request> Service<Request> for GuardService<S, E>
where
    Request: Clone + Send + 'static,
    S: Service<Request> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<E> + Send,
    S::Future: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = CallError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(|e| CallError::Inner(e.into()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let guard = self.guard.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            guard
                .execute(move || {
                    let mut inner = inner.clone();
                    let req = req.clone();
                    async move { inner.call(req).await.map_err(Into::into) }
                })
                .await
        })
    }
}
