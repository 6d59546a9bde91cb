//! Sliding-window rate limiting shared by every worker.
//!
//! The limiter keeps the grant times of the last minute in an ordered queue.
//! An acquisition evicts grants older than the window, and if the window is
//! full it sleeps until the oldest grant ages out. The queue lock is held
//! across that sleep, so waiting workers are admitted in arrival order
//! (tokio's mutex is FIFO) and no two workers can both see a free slot.
//!
//! Timestamps come from [`tokio::time::Instant`], so tests can drive the
//! limiter with a paused clock.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Length of the sliding window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Default number of grants allowed per window.
pub const DEFAULT_MAX_PER_MINUTE: usize = 60;

/// A process-wide limiter on outbound operations.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_per_minute` grants in any trailing
    /// minute. A limit of zero is treated as one.
    pub fn new(max_per_minute: usize) -> Self {
        Self::with_window(max_per_minute, WINDOW)
    }

    /// Creates a limiter with a custom window length.
    pub fn with_window(max_per_window: usize, window: Duration) -> Self {
        let max_per_window = max_per_window.max(1);
        RateLimiter {
            max_per_window,
            window,
            grants: Mutex::new(VecDeque::with_capacity(max_per_window)),
        }
    }

    pub fn max_per_window(&self) -> usize {
        self.max_per_window
    }

    /// Waits until a grant is allowed, then records it.
    ///
    /// After this returns, at most `max_per_window` grants (including this
    /// one) fall inside any trailing window.
    pub async fn acquire(&self) {
        let mut grants = self.grants.lock().await;
        loop {
            let now = Instant::now();
            evict_expired(&mut grants, now, self.window);

            if grants.len() < self.max_per_window {
                grants.push_back(now);
                trace!(in_window = grants.len(), "Rate limit permit granted");
                return;
            }

            // Full window means a front entry exists.
            let Some(&oldest) = grants.front() else {
                continue;
            };
            let wait = self.window.saturating_sub(now.duration_since(oldest));
            debug!(
                wait_ms = wait.as_millis() as u64,
                max_per_window = self.max_per_window,
                "Rate limit reached, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Returns how many grants currently fall inside the window.
    pub async fn in_window(&self) -> usize {
        let mut grants = self.grants.lock().await;
        evict_expired(&mut grants, Instant::now(), self.window);
        grants.len()
    }
}

fn evict_expired(grants: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = grants.front() {
        if now.duration_since(oldest) >= window {
            grants.pop_front();
        } else {
            break;
        }
    }
}
