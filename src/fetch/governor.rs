//! Shared outbound rate limit.
//!
//! A GCRA-style token bucket: every permit reserves the next emission slot
//! under a mutex, then sleeps until that slot outside the lock. Up to
//! `burst` permits may be granted back to back after an idle period.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

pub struct RateGovernor {
    interval: Duration,
    burst: u32,
    /// Theoretical arrival time of the next permit.
    next: Mutex<Option<Instant>>,
    granted: AtomicU64,
}

impl RateGovernor {
    /// One permit per `interval`, allowing `burst` permits at once.
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst: burst.max(1),
            next: Mutex::new(None),
            granted: AtomicU64::new(0),
        }
    }

    /// A governor that never waits.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO, 1)
    }

    /// Wait for a permit.
    pub async fn acquire(&self) {
        self.granted.fetch_add(1, Ordering::Relaxed);
        if self.interval.is_zero() {
            return;
        }

        let release_at = {
            let mut next = self.next.lock().await;
            let now = Instant::now();
            let tolerance = self.interval * (self.burst - 1);
            let tat = next.map_or(now, |t| t.max(now));
            *next = Some(tat + self.interval);
            tat.checked_sub(tolerance).filter(|t| *t > now)
        };

        if let Some(at) = release_at {
            trace!("rate governor: waiting {:?}", at - Instant::now());
            tokio::time::sleep_until(at).await;
        }
    }

    /// Number of permits handed out so far.
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }
}
