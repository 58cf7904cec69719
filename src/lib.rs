//! Adaptive rate-based backpressure for replicated cluster peers.
//!
//! Each peer gets a [`state::BackPressureState`] holding an incoming and an
//! outgoing windowed counter plus a rate limiter. Once per window the
//! [`controller::RateBasedBackPressure`] compares acknowledged traffic with
//! attempted traffic and retunes the limiter.
pub mod cli;
pub mod controller;
pub mod counter;
pub mod error;
pub mod limiter;
pub mod peer;
pub mod registry;
pub mod settings;
pub mod simulation;
pub mod state;
pub mod throttle;
pub mod time_source;

pub use controller::{BackPressureConfig, BackPressureStrategy, RateBasedBackPressure};
pub use error::{BackflowError, ConfigError, Result};
pub use peer::PeerId;
pub use registry::PeerRegistry;
pub use state::{BackPressureSnapshot, BackPressureState};
pub use time_source::{ManualTimeSource, MonotonicTimeSource, TimeSource};
