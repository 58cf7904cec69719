//! Rate-based back-pressure controller.
//!
//! Once per window the controller compares the rate of acknowledgments
//! received from a peer with the rate of messages sent to it:
//!
//! * ratio at or above the high threshold: the peer keeps up. The overload
//!   flag clears and a limiter that is actually binding grows by
//!   `rate / factor`.
//! * ratio below the high threshold: the limiter is pulled to
//!   `incoming * ratio`, i.e. `incoming² / outgoing`. At or below the low
//!   threshold the peer is flagged overloaded.
//!
//! Growth is additive and bounded by the factor while contraction scales
//! with the square of the imbalance.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};
use crate::peer::PeerId;
use crate::settings;
use crate::state::BackPressureState;
use crate::time_source::{MonotonicTimeSource, TimeSource};

pub const HIGH_RATIO: &str = "high_ratio";
pub const LOW_RATIO: &str = "low_ratio";
pub const FACTOR: &str = "factor";

const PARAMETER_COUNT: usize = 3;

/// Validated controller tunables
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct BackPressureConfig {
    high_ratio: f64,
    low_ratio: f64,
    factor: f64,
}

impl BackPressureConfig {
    pub fn new(high_ratio: f64, low_ratio: f64, factor: f64) -> std::result::Result<Self, ConfigError> {
        if !(high_ratio > 0.0 && high_ratio <= 1.0) {
            return Err(ConfigError::HighRatioOutOfRange(high_ratio));
        }
        if !(low_ratio > 0.0 && low_ratio <= 1.0) {
            return Err(ConfigError::LowRatioOutOfRange(low_ratio));
        }
        if high_ratio <= low_ratio {
            return Err(ConfigError::HighNotAboveLow {
                high: high_ratio,
                low: low_ratio,
            });
        }
        if !(factor >= 1.0) || factor.is_infinite() {
            return Err(ConfigError::FactorBelowOne(factor));
        }
        Ok(Self {
            high_ratio,
            low_ratio,
            factor,
        })
    }

    /// Build from the string map handed over by the configuration layer.
    /// Exactly `high_ratio`, `low_ratio` and `factor` must be present.
    pub fn from_params(params: &HashMap<String, String>) -> std::result::Result<Self, ConfigError> {
        if params.len() != PARAMETER_COUNT {
            return Err(ConfigError::WrongParameterCount {
                expected: PARAMETER_COUNT,
                found: params.len(),
            });
        }
        let high_ratio = parse_param(params, HIGH_RATIO)?;
        let low_ratio = parse_param(params, LOW_RATIO)?;
        let factor = parse_param(params, FACTOR)?;
        Self::new(high_ratio, low_ratio, factor)
    }

    pub fn high_ratio(&self) -> f64 {
        self.high_ratio
    }

    pub fn low_ratio(&self) -> f64 {
        self.low_ratio
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}

fn parse_param(
    params: &HashMap<String, String>,
    key: &'static str,
) -> std::result::Result<f64, ConfigError> {
    let raw = params.get(key).ok_or(ConfigError::MissingParameter(key))?;
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ConfigError::InvalidNumber {
            key,
            value: raw.clone(),
        }),
    }
}

/// Outbound back-pressure policy as seen by the messaging layer
pub trait BackPressureStrategy: Send + Sync {
    /// Fresh per-peer state: zero counters, unbounded rate, not overloaded
    fn new_state(&self, peer: PeerId) -> Arc<BackPressureState>;

    /// Close the current window for `state` if it is due and retune it.
    /// Calls inside an open window do nothing.
    fn apply(&self, state: &BackPressureState);

    fn apply_all<'a, I>(&self, states: I)
    where
        I: IntoIterator<Item = &'a BackPressureState>,
        Self: Sized,
    {
        for state in states {
            self.apply(state);
        }
    }
}

/// Outcome of one closed window
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correction {
    pub incoming_rate: f64,
    pub outgoing_rate: f64,
    pub ratio: f64,
    pub rate: f64,
    pub overloaded: bool,
}

#[derive(Clone, Debug)]
pub struct RateBasedBackPressure {
    config: BackPressureConfig,
    window: Duration,
    window_ms: u64,
    time_source: Arc<dyn TimeSource>,
}

impl RateBasedBackPressure {
    pub fn new(
        params: &HashMap<String, String>,
        time_source: Arc<dyn TimeSource>,
        window: Duration,
    ) -> Result<Self> {
        let config = BackPressureConfig::from_params(params)?;
        Self::from_config(config, time_source, window)
    }

    /// Monotonic clock and the default window
    pub fn with_defaults(params: &HashMap<String, String>) -> Result<Self> {
        Self::new(
            params,
            Arc::new(MonotonicTimeSource::new()),
            Duration::from_millis(settings::DEFAULT_WINDOW_MS),
        )
    }

    pub fn from_config(
        config: BackPressureConfig,
        time_source: Arc<dyn TimeSource>,
        window: Duration,
    ) -> Result<Self> {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        if window_ms == 0 {
            return Err(ConfigError::ZeroWindow.into());
        }
        Ok(Self {
            config,
            window,
            window_ms,
            time_source,
        })
    }

    pub fn config(&self) -> &BackPressureConfig {
        &self.config
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Pure control law for one closed window
    pub fn correction(&self, current: f64, incoming_rate: f64, outgoing_rate: f64) -> Correction {
        let ratio = if outgoing_rate > 0.0 {
            incoming_rate / outgoing_rate
        } else {
            1.0
        };

        let (rate, overloaded) = if ratio >= self.config.high_ratio {
            (self.relax(current, incoming_rate, outgoing_rate), false)
        } else {
            (incoming_rate * ratio, ratio <= self.config.low_ratio)
        };

        Correction {
            incoming_rate,
            outgoing_rate,
            ratio,
            rate,
            overloaded,
        }
    }

    fn relax(&self, current: f64, incoming_rate: f64, outgoing_rate: f64) -> f64 {
        if current.is_finite() && current < outgoing_rate {
            // limiter is below what was actually sent, so it is binding
            current + current / self.config.factor
        } else if outgoing_rate == 0.0 && incoming_rate > current {
            // nothing sent but backlog acknowledged faster than we allow
            incoming_rate
        } else {
            current
        }
    }
}

impl BackPressureStrategy for RateBasedBackPressure {
    fn new_state(&self, peer: PeerId) -> Arc<BackPressureState> {
        Arc::new(BackPressureState::new(peer, self.window))
    }

    fn apply(&self, state: &BackPressureState) {
        let now = self.time_source.now_millis();
        if !state.try_close_window(now, self.window_ms) {
            return;
        }

        let incoming_rate = state.incoming.close_window();
        let outgoing_rate = state.outgoing.close_window();
        let current = state.limiter.rate();
        let correction = self.correction(current, incoming_rate, outgoing_rate);

        if correction.rate != current {
            state.limiter.set_rate(correction.rate);
        }
        let was_overloaded = state.set_overload(correction.overloaded);

        debug!(
            peer = %state.peer(),
            incoming_rate = correction.incoming_rate,
            outgoing_rate = correction.outgoing_rate,
            ratio = correction.ratio,
            previous_rate = current,
            rate = correction.rate,
            "closed back-pressure window"
        );
        match (was_overloaded, correction.overloaded) {
            (false, true) => warn!(
                peer = %state.peer(),
                ratio = correction.ratio,
                rate = correction.rate,
                "peer overloaded"
            ),
            (true, false) => info!(peer = %state.peer(), rate = correction.rate, "peer recovered"),
            _ => {}
        }
    }
}
