//! Per-peer back-pressure states, looked up by peer identity.
//!
//! The controller itself only ever sees one state at a time; the messaging
//! layer owns this registry and hands states to it.
use std::sync::Arc;

use papaya::HashMap;
use tracing::debug;

use crate::controller::BackPressureStrategy;
use crate::peer::PeerId;
use crate::state::{BackPressureSnapshot, BackPressureState};

pub struct PeerRegistry<S: BackPressureStrategy> {
    strategy: Arc<S>,
    states: HashMap<PeerId, Arc<BackPressureState>>,
}

impl<S: BackPressureStrategy> PeerRegistry<S> {
    pub fn new(strategy: S) -> Self {
        Self::with_strategy(Arc::new(strategy))
    }

    pub fn with_strategy(strategy: Arc<S>) -> Self {
        Self {
            strategy,
            states: HashMap::new(),
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// State for `peer`, created on first use
    pub fn state_for(&self, peer: &PeerId) -> Arc<BackPressureState> {
        let guard = self.states.pin();
        if let Some(state) = guard.get(peer) {
            return state.clone();
        }
        guard
            .get_or_insert_with(peer.clone(), || {
                debug!(peer = %peer, "tracking back-pressure for new peer");
                self.strategy.new_state(peer.clone())
            })
            .clone()
    }

    pub fn get(&self, peer: &PeerId) -> Option<Arc<BackPressureState>> {
        self.states.pin().get(peer).cloned()
    }

    /// Stop tracking a peer, e.g. after it left the cluster
    pub fn remove(&self, peer: &PeerId) -> Option<Arc<BackPressureState>> {
        self.states.pin().remove(peer).cloned()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Give every tracked peer a chance to close its window
    pub fn apply_all(&self) {
        let guard = self.states.pin();
        self.strategy
            .apply_all(guard.iter().map(|(_, state)| state.as_ref()));
    }

    pub fn overloaded_peers(&self) -> Vec<PeerId> {
        let guard = self.states.pin();
        let mut peers: Vec<PeerId> = guard
            .iter()
            .filter(|(_, state)| state.is_overloaded())
            .map(|(peer, _)| peer.clone())
            .collect();
        peers.sort();
        peers
    }

    pub fn snapshots(&self) -> Vec<BackPressureSnapshot> {
        let guard = self.states.pin();
        let mut snapshots: Vec<BackPressureSnapshot> =
            guard.iter().map(|(_, state)| state.snapshot()).collect();
        snapshots.sort_by(|a, b| a.peer.cmp(&b.peer));
        snapshots
    }
}
