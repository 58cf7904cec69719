//! Injectable time for the control loop.
//!
//! The controller only ever asks for monotonic milliseconds. Production code
//! uses [`MonotonicTimeSource`]; tests drive a [`ManualTimeSource`] forward
//! explicitly so window boundaries are deterministic.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Source of monotonic milliseconds
pub trait TimeSource: Send + Sync + std::fmt::Debug {
    /// Milliseconds elapsed on a clock that never goes backwards
    fn now_millis(&self) -> u64;
}

/// Monotonic clock anchored at construction.
///
/// Backed by `tokio::time::Instant`, so a paused tokio runtime
/// (`start_paused = true`) drives it the same way it drives timers.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimeSource {
    anchor: Instant,
}

impl MonotonicTimeSource {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    #[inline]
    fn now_millis(&self) -> u64 {
        u64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    current_millis: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(initial_millis: u64) -> Self {
        Self {
            current_millis: Arc::new(AtomicU64::new(initial_millis)),
        }
    }

    /// Move time forward
    pub fn advance(&self, delta: Duration) {
        let millis = u64::try_from(delta.as_millis()).unwrap_or(u64::MAX);
        self.current_millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// "Sleeping" on a manual clock returns immediately with time moved forward
    pub fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    pub fn set_millis(&self, millis: u64) {
        self.current_millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    #[inline]
    fn now_millis(&self) -> u64 {
        self.current_millis.load(Ordering::SeqCst)
    }
}
