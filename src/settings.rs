//! Backflow application settings
use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::{FACTOR, HIGH_RATIO, LOW_RATIO};

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_HIGH_RATIO: f64 = 0.9;
pub const DEFAULT_LOW_RATIO: f64 = 0.1;
pub const DEFAULT_FACTOR: f64 = 5.0;
pub const DEFAULT_WINDOW_MS: u64 = 2000;

/// Controller tunables before validation
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct BackPressureSettings {
    pub high_ratio: f64,
    pub low_ratio: f64,
    pub factor: f64,
    pub window_ms: u64,
}

impl Default for BackPressureSettings {
    fn default() -> Self {
        Self {
            high_ratio: DEFAULT_HIGH_RATIO,
            low_ratio: DEFAULT_LOW_RATIO,
            factor: DEFAULT_FACTOR,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

impl BackPressureSettings {
    /// The string map the controller validates
    pub fn to_params(&self) -> HashMap<String, String> {
        HashMap::from([
            (HIGH_RATIO.to_string(), self.high_ratio.to_string()),
            (LOW_RATIO.to_string(), self.low_ratio.to_string()),
            (FACTOR.to_string(), self.factor.to_string()),
        ])
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Load profile for the traffic simulation
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SimulationSettings {
    // Messages per second each sender tries to push
    pub offered_rate: f64,

    // Messages per second each simulated peer can acknowledge, one entry per peer
    pub peer_capacities: Vec<f64>,

    // Messages a peer buffers before dropping
    pub queue_depth: usize,

    pub duration_secs: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            offered_rate: 200.0,
            peer_capacities: vec![50.0, 150.0],
            queue_depth: 64,
            duration_secs: 30,
        }
    }
}

impl SimulationSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub back_pressure: BackPressureSettings,
    pub simulation: SimulationSettings,
    pub log_json: bool,
    pub report_json: bool,
}
