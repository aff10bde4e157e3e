//! Suspension abstraction used between retry attempts.
//!
//! Production code sleeps on the tokio timer; tests inject `InstantSleeper`
//! or `TrackingSleeper` for fast, deterministic runs. Cancellation is by
//! future drop: abandoning the surrounding call drops the pending sleep.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Abstraction for the inter-attempt delay.
pub trait Sleeper: Send + Sync + std::fmt::Debug {
    /// Suspend for the given duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Production sleeper using the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Test sleeper that completes immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async {})
    }
}

/// Test sleeper that records every requested duration without sleeping.
#[derive(Debug, Clone, Default)]
pub struct TrackingSleeper {
    recorded: Arc<Mutex<Vec<Duration>>>,
}

impl TrackingSleeper {
    /// Create an empty tracking sleeper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sleep calls observed so far.
    pub fn calls(&self) -> usize {
        self.recorded.lock().unwrap().len()
    }

    /// Duration requested by the `idx`-th sleep call, if any.
    pub fn call_at(&self, idx: usize) -> Option<Duration> {
        self.recorded.lock().unwrap().get(idx).copied()
    }

    /// Snapshot of all recorded durations.
    pub fn recorded(&self) -> Vec<Duration> {
        self.recorded.lock().unwrap().clone()
    }
}

impl Sleeper for TrackingSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        self.recorded.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}
