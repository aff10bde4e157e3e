//! Minimal retry-only example.
use std::time::Duration;
use vendra_resilience::prelude::*;

#[tokio::main]
async fn main() -> Result<(), CallError<std::io::Error>> {
    let policy = RetryPolicy::builder()
        .max_attempts(3)
        .backoff(
            Backoff::exponential(Duration::from_millis(200))
                .with_max(Duration::from_secs(2))
                .expect("valid backoff cap"),
        )
        .with_jitter(Jitter::proportional(0.1).expect("valid jitter"))
        .build()
        .expect("valid retry policy");

    let value = policy
        .execute(|| async {
            // Replace with your real fallible work
            Ok::<_, CallError<std::io::Error>>("hello from retry")
        })
        .await?;

    println!("{}", value);
    Ok(())
}
