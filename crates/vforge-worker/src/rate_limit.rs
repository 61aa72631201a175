//! Global intake fetch throttle.
//!
//! One fetch call per window across the whole intake pool, so concurrent
//! workers cannot hammer the upstream platform. Backed by a governor
//! direct rate limiter shared behind an Arc.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Shared minimum-interval limiter for external fetch calls.
pub struct FetchThrottle {
    limiter: DefaultDirectRateLimiter,
}

impl FetchThrottle {
    /// Create a throttle allowing one call per `min_interval`.
    pub fn new(min_interval: Duration) -> Self {
        let quota = Quota::with_period(min_interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Wait until the next fetch call is allowed.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn second_acquire_waits_for_the_window() {
        let throttle = FetchThrottle::new(Duration::from_millis(50));

        let start = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn zero_interval_does_not_panic() {
        let throttle = FetchThrottle::new(Duration::ZERO);
        throttle.acquire().await;
    }
}
