//! Client-side limiter for mailbox provider calls: a concurrency ceiling plus
//! a minimum gap between call starts.

use crate::config::RateLimitConfig;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Holds one concurrency slot of a [`RateLimiter`].
#[derive(Debug)]
pub struct RatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Leaky-bucket style limiter shared by every call against one mailbox.
#[derive(Debug)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    min_spacing: Duration,
    next_start: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            min_spacing: config.min_spacing,
            next_start: Mutex::new(None),
        }
    }

    /// Wait for a slot. The returned permit holds the concurrency slot until dropped.
    pub async fn acquire(&self) -> RatePermit {
        // the semaphore is never closed
        let permit = self.semaphore.clone().acquire_owned().await.ok();

        let start = {
            let mut next = self.next_start.lock();
            let now = Instant::now();
            let start = next.map_or(now, |n| n.max(now));
            *next = Some(start + self.min_spacing);
            start
        };
        tokio::time::sleep_until(start).await;

        RatePermit { _permit: permit }
    }

    /// Run a future inside a slot.
    pub async fn run<F: Future>(&self, fut: F) -> F::Output {
        let _permit = self.acquire().await;
        fut.await
    }

    /// Calls that could start right now without waiting for a slot.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
