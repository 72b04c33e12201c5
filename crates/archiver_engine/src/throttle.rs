use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Shared request pacing for one host.
///
/// Every request takes the next free slot; slots are `base_delay` apart. A
/// rate-limit response pushes the next slot out for everyone, not only for the
/// request that was refused.
#[derive(Debug)]
pub struct RateLimiter {
    base_delay: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            next_slot: Mutex::new(None),
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Waits for this caller's slot. The first request of a run goes immediately.
    pub async fn acquire(&self) {
        let start = {
            let mut slot = self.next_slot.lock().await;
            let now = Instant::now();
            let start = match *slot {
                Some(at) if at > now => at,
                _ => now,
            };
            *slot = Some(start + self.base_delay);
            start
        };
        sleep_until(start).await;
    }

    /// Holds every request back for at least `pause` from now.
    pub async fn pause_for(&self, pause: Duration) {
        let mut slot = self.next_slot.lock().await;
        let until = Instant::now() + pause;
        if slot.map_or(true, |at| at < until) {
            *slot = Some(until);
        }
    }
}

/// Waits applied to consecutive rate-limit responses of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    steps: Vec<Duration>,
}

impl BackoffSchedule {
    pub fn new(steps: Vec<Duration>) -> Self {
        Self { steps }
    }

    /// Wait before retry number `attempt` (0-based), or `None` once exhausted.
    pub fn delay_for(&self, attempt: usize) -> Option<Duration> {
        self.steps.get(attempt).copied()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self::new(vec![Duration::from_secs(60), Duration::from_secs(120)])
    }
}
