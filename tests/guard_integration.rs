use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{service_fn, Layer, ServiceExt};
use vendra_resilience::{
    Backoff, BackendError, BackendErrorKind, CallError, CallGuard, CircuitBreakerPolicy,
    GuardLayer, InstantSleeper, Jitter, RetryFilter, RetryPolicy,
};

fn fast_retry(max_attempts: usize) -> RetryPolicy<BackendError> {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .backoff(Backoff::constant(Duration::from_millis(1)))
        .with_jitter(Jitter::None)
        .with_sleeper(InstantSleeper)
        .should_retry(RetryFilter::default().into_predicate())
        .build()
        .expect("valid retry policy")
}

#[tokio::test]
async fn guard_recovers_through_full_breaker_cycle() {
    let breaker =
        CircuitBreakerPolicy::new(2, Duration::from_millis(100)).expect("valid breaker");
    let guard = CallGuard::builder("listings")
        .breaker(breaker)
        .retry(fast_retry(1))
        .build();

    let invocations = Arc::new(AtomicUsize::new(0));

    // Two failing logical calls trip the breaker.
    for _ in 0..2 {
        let invocations = invocations.clone();
        let result = guard
            .execute(|| {
                let invocations = invocations.clone();
                async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(BackendError::new(BackendErrorKind::Network, "reset"))
                }
            })
            .await;
        assert!(matches!(result, Err(CallError::Inner(_))));
    }
    assert_eq!(invocations.load(Ordering::SeqCst), 2);

    // In-window call fails fast without touching the backend.
    let result = guard.execute(|| async { Ok::<_, BackendError>(()) }).await;
    assert!(result.unwrap_err().is_circuit_open());
    assert_eq!(invocations.load(Ordering::SeqCst), 2);

    // After the recovery timeout the probe goes through and closes the
    // circuit again.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let invocations_clone = invocations.clone();
    let result = guard
        .execute(|| {
            let invocations = invocations_clone.clone();
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BackendError>("recovered")
            }
        })
        .await;
    assert_eq!(result.unwrap(), "recovered");
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    // Subsequent calls flow normally.
    let result = guard.execute(|| async { Ok::<_, BackendError>("steady") }).await;
    assert_eq!(result.unwrap(), "steady");
}

#[tokio::test]
async fn transient_errors_are_retried_but_auth_errors_are_not() {
    let guard = CallGuard::builder("messages").retry(fast_retry(3)).build();

    // Transient: two 503s then success, three invocations total.
    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations_clone = invocations.clone();
    let result = guard
        .execute(|| {
            let invocations = invocations_clone.clone();
            async move {
                let n = invocations.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(BackendError::from_status(503, "unavailable"))
                } else {
                    Ok("delivered")
                }
            }
        })
        .await;
    assert_eq!(result.unwrap(), "delivered");
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    // Auth: single invocation, immediate propagation.
    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations_clone = invocations.clone();
    let result = guard
        .execute(|| {
            let invocations = invocations_clone.clone();
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(BackendError::from_status(401, "session expired"))
            }
        })
        .await;
    let err = result.unwrap_err();
    assert_eq!(err.as_inner().unwrap().code(), Some("401"));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhaustion_surfaces_the_final_attempt_error() {
    let guard = CallGuard::builder("favorites").retry(fast_retry(3)).build();

    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations_clone = invocations.clone();
    let result = guard
        .execute(|| {
            let invocations = invocations_clone.clone();
            async move {
                let n = invocations.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(
                    BackendError::new(BackendErrorKind::Timeout, format!("attempt {}", n)),
                )
            }
        })
        .await;

    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    let inner = result.unwrap_err().into_inner().expect("inner error");
    assert_eq!(inner.message(), "attempt 2", "caller sees the last attempt's error as-is");
}

#[tokio::test]
async fn guarded_tower_service_end_to_end() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations_clone = invocations.clone();

    let svc = service_fn(move |req: &'static str| {
        let invocations = invocations_clone.clone();
        async move {
            let n = invocations.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(BackendError::new(BackendErrorKind::Network, "cold start"))
            } else {
                Ok(format!("fetched {}", req))
            }
        }
    });

    let guard = CallGuard::builder("projects").retry(fast_retry(3)).build();
    let guarded = GuardLayer::new(guard).layer(svc);

    let result = guarded.oneshot("project-7").await;
    assert_eq!(result.unwrap(), "fetched project-7");
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_callers_share_one_circuit() {
    let breaker =
        CircuitBreakerPolicy::new(3, Duration::from_secs(10)).expect("valid breaker");
    let guard = CallGuard::builder("search")
        .breaker(breaker)
        .retry(fast_retry(1))
        .build();

    let mut handles = vec![];
    for _ in 0..3 {
        let guard = guard.clone();
        handles.push(tokio::spawn(async move {
            guard
                .execute(|| async {
                    Err::<(), _>(BackendError::new(BackendErrorKind::Network, "reset"))
                })
                .await
        }));
    }
    for handle in handles {
        let _ = handle.await.expect("join");
    }

    // All three failures landed on the same breaker, so it is now open for
    // every clone.
    let result = guard.execute(|| async { Ok::<_, BackendError>(()) }).await;
    assert!(result.unwrap_err().is_circuit_open());
}
