use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

const MIN_RPS: f64 = 0.001;

/// Paces outbound calls so consecutive starts are at least `1 / rps` apart.
///
/// Callers queue on a fair mutex, so slots are handed out in submission order. The pacing sleep
/// happens while the lock is held; the work itself runs after the lock is released.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let rps = if requests_per_second.is_finite() {
            requests_per_second.max(MIN_RPS)
        } else {
            MIN_RPS
        };
        Self {
            interval: Duration::from_secs_f64(1.0 / rps),
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next start slot.
    pub async fn acquire(&self) {
        let mut next = self.next_slot.lock().await;
        if let Some(at) = *next {
            if at > Instant::now() {
                sleep_until(at).await;
            }
        }
        *next = Some(Instant::now() + self.interval);
    }

    pub async fn schedule<F, Fut, T>(&self, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await;
        work().await
    }
}
