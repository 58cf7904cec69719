//! Send pacing layered on a limiter rate.
//!
//! A reservation claims the next free slot and pushes the following one
//! `permits / rate` seconds later, so consecutive sends are evenly spaced.
//! The first send after an idle period goes out immediately.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// No single reservation waits longer than this
pub const MAX_PACING_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct SendThrottle {
    anchor: Instant,
    // nanoseconds since `anchor` at which the next slot opens
    next_free_nanos: AtomicU64,
}

impl SendThrottle {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
            next_free_nanos: AtomicU64::new(0),
        }
    }

    /// Reserve `permits` at `rate` per second and return how long the caller
    /// must wait before sending. An infinite rate never waits.
    pub fn reserve(&self, rate: f64, permits: u32) -> Duration {
        if rate.is_infinite() && rate > 0.0 {
            return Duration::ZERO;
        }
        let interval = pacing_interval(rate, permits);
        let interval_nanos = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX);
        let now = u64::try_from(self.anchor.elapsed().as_nanos()).unwrap_or(u64::MAX);

        let mut current = self.next_free_nanos.load(Ordering::Acquire);
        loop {
            let start = current.max(now);
            let next = start.saturating_add(interval_nanos);
            match self.next_free_nanos.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Duration::from_nanos(start - now),
                Err(actual) => current = actual,
            }
        }
    }

    /// Wait until `permits` may be sent at `rate` per second
    pub async fn acquire(&self, rate: f64, permits: u32) {
        let wait = self.reserve(rate, permits);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

impl Default for SendThrottle {
    fn default() -> Self {
        Self::new()
    }
}

/// Time one reservation of `permits` occupies at `rate`
fn pacing_interval(rate: f64, permits: u32) -> Duration {
    if rate.is_nan() || rate <= 0.0 {
        return MAX_PACING_INTERVAL;
    }
    let seconds = f64::from(permits) / rate;
    if seconds >= MAX_PACING_INTERVAL.as_secs_f64() {
        MAX_PACING_INTERVAL
    } else {
        Duration::from_secs_f64(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_rate_never_waits() {
        let throttle = SendThrottle::new();
        for _ in 0..100 {
            assert_eq!(throttle.reserve(f64::INFINITY, 10), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reservations_are_spaced_by_rate() {
        let throttle = SendThrottle::new();
        assert_eq!(throttle.reserve(4.0, 1), Duration::ZERO);
        assert_eq!(throttle.reserve(4.0, 1), Duration::from_millis(250));
        assert_eq!(throttle.reserve(4.0, 2), Duration::from_millis(500));
        assert_eq!(throttle.reserve(4.0, 1), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_is_not_banked() {
        let throttle = SendThrottle::new();
        throttle.reserve(10.0, 1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(throttle.reserve(10.0, 1), Duration::ZERO);
        assert_eq!(throttle.reserve(10.0, 1), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_sleeps_for_reservation() {
        let throttle = SendThrottle::new();
        let start = Instant::now();
        throttle.acquire(2.0, 1).await;
        throttle.acquire(2.0, 1).await;
        throttle.acquire(2.0, 1).await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[test]
    fn zero_rate_waits_the_maximum() {
        assert_eq!(pacing_interval(0.0, 1), MAX_PACING_INTERVAL);
        assert_eq!(pacing_interval(f64::NAN, 1), MAX_PACING_INTERVAL);
        assert_eq!(pacing_interval(1e-12, 1), MAX_PACING_INTERVAL);
    }
}
