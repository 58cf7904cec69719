//! Per-peer back-pressure state
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::counter::WindowedCounter;
use crate::limiter::AdjustableRateLimiter;
use crate::peer::PeerId;
use crate::throttle::SendThrottle;

/// Everything the controller needs to know about traffic to one peer.
///
/// Shared by every caller sending to or receiving from that peer, usually
/// behind an `Arc`. All mutation goes through atomics, so recording traffic,
/// reading the overload flag and applying a correction never block each
/// other.
#[derive(Debug)]
pub struct BackPressureState {
    peer: PeerId,
    pub(crate) incoming: WindowedCounter,
    pub(crate) outgoing: WindowedCounter,
    pub(crate) limiter: AdjustableRateLimiter,
    overload: AtomicBool,
    /// Monotonic millis of the last closed window, 0 = never
    last_decision: AtomicU64,
    windows_closed: AtomicU64,
    throttle: SendThrottle,
}

/// Point-in-time view of a state for telemetry
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct BackPressureSnapshot {
    pub peer: PeerId,
    /// `None` while the limiter is unbounded
    pub rate: Option<f64>,
    pub overloaded: bool,
    pub last_decision_ms: u64,
    pub windows_closed: u64,
    pub pending_incoming: u64,
    pub pending_outgoing: u64,
    pub observed_at: DateTime<Utc>,
}

impl BackPressureState {
    pub(crate) fn new(peer: PeerId, window: Duration) -> Self {
        Self {
            peer,
            incoming: WindowedCounter::new(window),
            outgoing: WindowedCounter::new(window),
            limiter: AdjustableRateLimiter::new(),
            overload: AtomicBool::new(false),
            last_decision: AtomicU64::new(0),
            windows_closed: AtomicU64::new(0),
            throttle: SendThrottle::new(),
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Record acknowledgments received from the peer
    #[inline]
    pub fn record_incoming(&self, n: u64) {
        self.incoming.update(n);
    }

    /// Record messages sent to the peer
    #[inline]
    pub fn record_outgoing(&self, n: u64) {
        self.outgoing.update(n);
    }

    /// Permitted outbound rate in events per second (infinite when unbounded)
    pub fn current_rate(&self) -> f64 {
        self.limiter.rate()
    }

    pub fn is_overloaded(&self) -> bool {
        self.overload.load(Ordering::Acquire)
    }

    pub fn last_decision(&self) -> u64 {
        self.last_decision.load(Ordering::Acquire)
    }

    pub fn windows_closed(&self) -> u64 {
        self.windows_closed.load(Ordering::Acquire)
    }

    pub fn incoming_counter(&self) -> &WindowedCounter {
        &self.incoming
    }

    pub fn outgoing_counter(&self) -> &WindowedCounter {
        &self.outgoing
    }

    /// Wait until `permits` sends fit under the current rate
    pub async fn acquire(&self, permits: u32) {
        self.throttle.acquire(self.current_rate(), permits).await;
    }

    pub(crate) fn set_overload(&self, overloaded: bool) -> bool {
        self.overload.swap(overloaded, Ordering::AcqRel)
    }

    /// Claim the window ending at `now` if a full window has passed.
    ///
    /// Check and advance are a single compare-and-swap: of several callers
    /// racing on the same window exactly one gets `true`.
    pub(crate) fn try_close_window(&self, now: u64, window_ms: u64) -> bool {
        let last = self.last_decision.load(Ordering::Acquire);
        if now.saturating_sub(last) < window_ms {
            return false;
        }
        let claimed = self
            .last_decision
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.windows_closed.fetch_add(1, Ordering::AcqRel);
        }
        claimed
    }

    pub fn snapshot(&self) -> BackPressureSnapshot {
        let rate = self.current_rate();
        BackPressureSnapshot {
            peer: self.peer.clone(),
            rate: rate.is_finite().then_some(rate),
            overloaded: self.is_overloaded(),
            last_decision_ms: self.last_decision(),
            windows_closed: self.windows_closed(),
            pending_incoming: self.incoming.count(),
            pending_outgoing: self.outgoing.count(),
            observed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_state() -> BackPressureState {
        BackPressureState::new("peer-a".into(), Duration::from_secs(6))
    }

    #[test]
    fn fresh_state_defaults() {
        let state = new_state();
        assert_eq!(state.peer().as_str(), "peer-a");
        assert_eq!(state.current_rate(), f64::INFINITY);
        assert!(!state.is_overloaded());
        assert_eq!(state.last_decision(), 0);
        assert_eq!(state.windows_closed(), 0);
        assert_eq!(state.incoming_counter().count(), 0);
        assert_eq!(state.outgoing_counter().count(), 0);
    }

    #[test]
    fn records_land_on_their_counter() {
        let state = new_state();
        state.record_incoming(3);
        state.record_outgoing(7);
        state.record_outgoing(1);
        assert_eq!(state.incoming_counter().count(), 3);
        assert_eq!(state.outgoing_counter().count(), 8);
    }

    #[test]
    fn window_is_claimed_only_after_full_window() {
        let state = new_state();
        assert!(!state.try_close_window(5_999, 6_000));
        assert!(state.try_close_window(6_000, 6_000));
        assert_eq!(state.last_decision(), 6_000);
        assert!(!state.try_close_window(11_999, 6_000));
        assert_eq!(state.last_decision(), 6_000);
        assert!(state.try_close_window(12_500, 6_000));
        assert_eq!(state.last_decision(), 12_500);
        assert_eq!(state.windows_closed(), 2);
    }

    #[test]
    fn clock_behind_last_decision_is_gated() {
        let state = new_state();
        assert!(state.try_close_window(10_000, 6_000));
        assert!(!state.try_close_window(3_000, 6_000));
        assert_eq!(state.last_decision(), 10_000);
    }

    #[test]
    fn racing_claims_close_one_window() {
        let state = Arc::new(new_state());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || state.try_close_window(6_000, 6_000))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|claimed| *claimed)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(state.windows_closed(), 1);
    }

    #[test]
    fn snapshot_reports_unbounded_as_none() {
        let state = new_state();
        state.record_outgoing(4);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.rate, None);
        assert_eq!(snapshot.pending_outgoing, 4);

        state.limiter.set_rate(2.5);
        state.set_overload(true);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.rate, Some(2.5));
        assert!(snapshot.overloaded);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["peer"], "peer-a");
        assert_eq!(json["rate"], 2.5);
    }
}
