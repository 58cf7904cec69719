//! End-to-end traffic simulation.
//!
//! Each simulated peer drains a bounded queue at a fixed capacity and sends
//! one acknowledgment per processed message. A full queue drops the message,
//! so it is never acknowledged. Senders push a fixed offered load, paced by
//! their peer's back-pressure state, while a control loop applies the
//! strategy to every peer four times per window.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::controller::RateBasedBackPressure;
use crate::error::{BackflowError, Result};
use crate::peer::PeerId;
use crate::registry::PeerRegistry;
use crate::settings::{BackPressureSettings, Settings, SimulationSettings};
use crate::state::BackPressureState;
use crate::time_source::MonotonicTimeSource;
use crate::transport_error;

const MAX_SIMULATED_RATE: f64 = 1_000_000.0;

/// What happened to a message handed to a peer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Dropped,
}

/// Outbound path to one peer
#[async_trait]
pub trait PeerLink: Send + Sync {
    fn peer(&self) -> &PeerId;

    async fn send(&self, message_id: u64) -> Result<Delivery>;
}

#[derive(Debug, Default)]
pub struct LinkStats {
    pub queued: AtomicU64,
    pub dropped: AtomicU64,
    pub acknowledged: AtomicU64,
}

/// Peer that acknowledges at most `capacity` messages per second
pub struct SimulatedPeer {
    peer: PeerId,
    queue: mpsc::Sender<u64>,
    stats: Arc<LinkStats>,
}

impl SimulatedPeer {
    /// Start the peer's processing task. Acknowledged message ids arrive on
    /// the returned receiver.
    pub fn spawn(
        peer: PeerId,
        capacity: f64,
        queue_depth: usize,
    ) -> (Self, mpsc::UnboundedReceiver<u64>, JoinHandle<()>) {
        let (queue, mut inbox) = mpsc::channel::<u64>(queue_depth);
        let (acks, ack_rx) = mpsc::unbounded_channel();
        let period = period_for(capacity);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(message_id) = inbox.recv().await else {
                    break;
                };
                if acks.send(message_id).is_err() {
                    break;
                }
            }
        });

        let link = Self {
            peer,
            queue,
            stats: Arc::new(LinkStats::default()),
        };
        (link, ack_rx, handle)
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl PeerLink for SimulatedPeer {
    fn peer(&self) -> &PeerId {
        &self.peer
    }

    async fn send(&self, message_id: u64) -> Result<Delivery> {
        match self.queue.try_send(message_id) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                Ok(Delivery::Queued)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(Delivery::Dropped)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(transport_error!("peer {} stopped processing", self.peer))
            }
        }
    }
}

/// State of one peer right after one of its windows closed
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WindowSample {
    pub elapsed_ms: u64,
    pub peer: PeerId,
    pub rate: Option<f64>,
    pub overloaded: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeerSummary {
    pub peer: PeerId,
    pub capacity: f64,
    pub queued: u64,
    pub dropped: u64,
    pub acknowledged: u64,
    pub final_rate: Option<f64>,
    pub overloaded_windows: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationReport {
    pub back_pressure: BackPressureSettings,
    pub samples: Vec<WindowSample>,
    pub peers: Vec<PeerSummary>,
}

impl SimulationReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn peer(&self, peer: &PeerId) -> Option<&PeerSummary> {
        self.peers.iter().find(|summary| &summary.peer == peer)
    }
}

pub fn validate(settings: &SimulationSettings) -> Result<()> {
    let valid_rate = |rate: f64| rate > 0.0 && rate <= MAX_SIMULATED_RATE;
    if !valid_rate(settings.offered_rate) {
        return Err(BackflowError::Simulation(format!(
            "offered rate must be in (0, {}], got {}",
            MAX_SIMULATED_RATE, settings.offered_rate
        )));
    }
    if settings.peer_capacities.is_empty() {
        return Err(BackflowError::Simulation(
            "at least one peer capacity is required".to_string(),
        ));
    }
    if let Some(capacity) = settings.peer_capacities.iter().find(|c| !valid_rate(**c)) {
        return Err(BackflowError::Simulation(format!(
            "peer capacity must be in (0, {}], got {}",
            MAX_SIMULATED_RATE, capacity
        )));
    }
    if settings.queue_depth == 0 {
        return Err(BackflowError::Simulation(
            "queue depth must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Run the simulation described by `settings` to completion
pub async fn run(settings: &Settings) -> Result<SimulationReport> {
    let sim = &settings.simulation;
    validate(sim)?;

    let window = settings.back_pressure.window();
    let controller = RateBasedBackPressure::new(
        &settings.back_pressure.to_params(),
        Arc::new(MonotonicTimeSource::new()),
        window,
    )?;
    let registry = PeerRegistry::new(controller);

    let mut tasks = Vec::new();
    let mut links = Vec::new();
    for (index, capacity) in sim.peer_capacities.iter().copied().enumerate() {
        let peer = PeerId::from(format!("peer-{}", index));
        let state = registry.state_for(&peer);
        let (link, acks, peer_task) = SimulatedPeer::spawn(peer.clone(), capacity, sim.queue_depth);
        let stats = link.stats();
        let link = Arc::new(link);

        tasks.push(peer_task);
        tasks.push(tokio::spawn(count_acks(acks, state.clone(), stats.clone())));
        tasks.push(tokio::spawn(drive_sender(link, state, sim.offered_rate)));
        links.push((peer, capacity, stats));
    }

    info!(
        peers = links.len(),
        offered_rate = sim.offered_rate,
        window_ms = settings.back_pressure.window_ms,
        "starting simulation"
    );

    let started = Instant::now();
    let deadline = started + sim.duration();
    let mut ticker = interval((window / 4).max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seen: HashMap<PeerId, u64> = HashMap::new();
    let mut samples = Vec::new();

    while Instant::now() < deadline {
        ticker.tick().await;
        registry.apply_all();
        for snapshot in registry.snapshots() {
            let last = seen.entry(snapshot.peer.clone()).or_insert(0);
            if snapshot.windows_closed <= *last {
                continue;
            }
            *last = snapshot.windows_closed;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            info!(
                peer = %snapshot.peer,
                elapsed_ms,
                rate = ?snapshot.rate,
                overloaded = snapshot.overloaded,
                "window closed"
            );
            samples.push(WindowSample {
                elapsed_ms,
                peer: snapshot.peer,
                rate: snapshot.rate,
                overloaded: snapshot.overloaded,
            });
        }
    }

    for task in &tasks {
        task.abort();
    }

    let peers = links
        .into_iter()
        .map(|(peer, capacity, stats)| {
            let final_rate = registry
                .get(&peer)
                .map(|state| state.current_rate())
                .filter(|rate| rate.is_finite());
            let overloaded_windows = samples
                .iter()
                .filter(|s| s.peer == peer && s.overloaded)
                .count();
            PeerSummary {
                peer,
                capacity,
                queued: stats.queued.load(Ordering::Relaxed),
                dropped: stats.dropped.load(Ordering::Relaxed),
                acknowledged: stats.acknowledged.load(Ordering::Relaxed),
                final_rate,
                overloaded_windows,
            }
        })
        .collect();

    Ok(SimulationReport {
        back_pressure: settings.back_pressure.clone(),
        samples,
        peers,
    })
}

async fn drive_sender<L: PeerLink>(link: Arc<L>, state: Arc<BackPressureState>, offered_rate: f64) {
    let mut offered = interval(period_for(offered_rate));
    offered.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut message_id = 0u64;
    loop {
        offered.tick().await;
        state.acquire(1).await;
        match link.send(message_id).await {
            Ok(_) => state.record_outgoing(1),
            Err(err) => {
                warn!(peer = %link.peer(), error = %err, "sender stopped");
                break;
            }
        }
        message_id += 1;
    }
}

async fn count_acks(
    mut acks: mpsc::UnboundedReceiver<u64>,
    state: Arc<BackPressureState>,
    stats: Arc<LinkStats>,
) {
    while acks.recv().await.is_some() {
        stats.acknowledged.fetch_add(1, Ordering::Relaxed);
        state.record_incoming(1);
    }
}

fn period_for(rate: f64) -> Duration {
    if rate.is_nan() || rate <= 0.0 {
        return Duration::from_secs(3600);
    }
    Duration::from_secs_f64((1.0 / rate).min(3600.0)).max(Duration::from_micros(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_load_profiles() {
        let mut sim = SimulationSettings::default();
        assert!(validate(&sim).is_ok());

        sim.offered_rate = 0.0;
        assert!(validate(&sim).is_err());

        let mut sim = SimulationSettings::default();
        sim.peer_capacities = vec![];
        assert!(validate(&sim).is_err());

        let mut sim = SimulationSettings::default();
        sim.peer_capacities = vec![10.0, f64::NAN];
        assert!(validate(&sim).is_err());

        let mut sim = SimulationSettings::default();
        sim.queue_depth = 0;
        let err = validate(&sim).unwrap_err();
        assert_eq!(err.error_type(), "simulation_error");
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops() {
        let (link, _acks, task) = SimulatedPeer::spawn("p".into(), 1.0, 2);
        // let the peer pick up its first message
        assert_eq!(link.send(0).await.unwrap(), Delivery::Queued);
        tokio::task::yield_now().await;
        let mut outcomes = Vec::new();
        for id in 1..10 {
            outcomes.push(link.send(id).await.unwrap());
        }
        assert!(outcomes.contains(&Delivery::Dropped));
        let stats = link.stats();
        assert!(stats.dropped.load(Ordering::Relaxed) > 0);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_peer_is_a_transport_error() {
        let (link, _acks, task) = SimulatedPeer::spawn("p".into(), 1.0, 2);
        task.abort();
        let _ = task.await;
        let err = link.send(1).await.unwrap_err();
        assert_eq!(err.error_type(), "transport_error");
    }

    #[tokio::test(start_paused = true)]
    async fn acks_arrive_at_capacity() {
        let (link, mut acks, task) = SimulatedPeer::spawn("p".into(), 10.0, 100);
        for id in 0..20 {
            link.send(id).await.unwrap();
        }
        let start = Instant::now();
        for expected in 0..20 {
            assert_eq!(acks.recv().await, Some(expected));
        }
        // 20 messages at 10/s, first one immediate
        assert!(start.elapsed() >= Duration::from_millis(1900));
        task.abort();
    }
}
