//! Tumbling-window event counter
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counts events within a fixed window and reports events per second for
/// the window being closed.
///
/// The rate is only evaluated when a window closes: `close_window()` divides
/// the accumulated count by the full window length.
#[derive(Debug)]
pub struct WindowedCounter {
    count: AtomicU64,
    window: Duration,
}

impl WindowedCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            count: AtomicU64::new(0),
            window,
        }
    }

    /// Add `n` events to the current window
    #[inline]
    pub fn update(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Events accumulated since the last close
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Read the rate of the window just ending and start a new one.
    ///
    /// Read and reset happen in one swap, so events recorded concurrently
    /// land in exactly one of the two windows.
    pub fn close_window(&self) -> f64 {
        let closed = self.count.swap(0, Ordering::AcqRel);
        self.per_second(closed)
    }

    fn per_second(&self, count: u64) -> f64 {
        let seconds = self.window.as_secs_f64();
        if seconds > 0.0 {
            count as f64 / seconds
        } else {
            0.0
        }
    }
}
