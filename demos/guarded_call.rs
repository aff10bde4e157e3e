//! Guarded backend call: retry inside a circuit breaker, with tracing output.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vendra_resilience::{presets, BackendError, BackendErrorKind};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let guard = presets::marketplace("listings");

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    // Fails twice with a transient network error, then succeeds; watch the
    // retry warnings in the log output.
    let result = guard
        .execute(|| {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(BackendError::new(BackendErrorKind::Network, "connection reset"))
                } else {
                    Ok(vec!["listing-1", "listing-2"])
                }
            }
        })
        .await;

    match result {
        Ok(rows) => println!("fetched {} listings after {} calls", rows.len(), calls.load(Ordering::SeqCst)),
        Err(e) => eprintln!("giving up: {}", e),
    }
}
