use std::sync::atomic::{AtomicU64, Ordering};

/// Permitted outbound rate for one peer, in events per second.
///
/// Starts unbounded (`f64::INFINITY`). Only the controller changes it; the
/// sender reads it to pace traffic.
#[derive(Debug)]
pub struct AdjustableRateLimiter {
    // f64 bits
    rate: AtomicU64,
}

impl AdjustableRateLimiter {
    pub fn new() -> Self {
        Self {
            rate: AtomicU64::new(f64::INFINITY.to_bits()),
        }
    }

    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate.load(Ordering::Acquire))
    }

    pub fn is_unbounded(&self) -> bool {
        self.rate().is_infinite()
    }

    /// Negative and NaN rates clamp to zero
    pub(crate) fn set_rate(&self, rate: f64) {
        let rate = if rate.is_nan() { 0.0 } else { rate.max(0.0) };
        self.rate.store(rate.to_bits(), Ordering::Release);
    }
}

impl Default for AdjustableRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
