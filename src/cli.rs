//! CLI for the backflow simulator
//!
use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
#[clap(name = settings::APP_NAME, version = settings::APP_VERSION)]
pub struct Cli {
    // Ratio of acknowledged to sent traffic at or above which a peer keeps up
    #[clap(
        long,
        default_value_t = settings::DEFAULT_HIGH_RATIO,
        env("BACKFLOW_HIGH_RATIO"),
        help = "Ratio at or above which the rate limiter may grow, in (0, 1]"
    )]
    pub high_ratio: f64,

    // Ratio at or below which a peer is flagged overloaded
    #[clap(
        long,
        default_value_t = settings::DEFAULT_LOW_RATIO,
        env("BACKFLOW_LOW_RATIO"),
        help = "Ratio at or below which a peer is overloaded, in (0, 1]"
    )]
    pub low_ratio: f64,

    #[clap(
        long,
        default_value_t = settings::DEFAULT_FACTOR,
        env("BACKFLOW_FACTOR"),
        help = "Growth divisor: the rate grows by rate/factor per healthy window"
    )]
    pub factor: f64,

    #[clap(
        long,
        default_value_t = settings::DEFAULT_WINDOW_MS,
        env("BACKFLOW_WINDOW_MS"),
        help = "Measurement window in milliseconds"
    )]
    pub window_ms: u64,

    #[clap(
        long,
        default_value = "200",
        env("BACKFLOW_OFFERED_RATE"),
        help = "Messages per second each sender tries to push"
    )]
    pub offered_rate: f64,

    #[clap(
        long,
        value_delimiter = ',',
        default_value = "50,150",
        env("BACKFLOW_PEER_CAPACITIES"),
        help = "Acknowledgments per second per simulated peer (e.g., 50,150)"
    )]
    pub peer_capacities: Vec<f64>,

    #[clap(
        long,
        default_value = "64",
        env("BACKFLOW_QUEUE_DEPTH"),
        help = "Messages a simulated peer buffers before dropping"
    )]
    pub queue_depth: usize,

    #[clap(
        long,
        default_value = "30",
        env("BACKFLOW_DURATION_SECS"),
        help = "How long to run the simulation"
    )]
    pub duration_secs: u64,

    #[clap(long, env("BACKFLOW_LOG_JSON"), help = "Emit logs as JSON")]
    pub log_json: bool,

    #[clap(long, help = "Print the final report as JSON on stdout")]
    pub report_json: bool,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            back_pressure: settings::BackPressureSettings {
                high_ratio: self.high_ratio,
                low_ratio: self.low_ratio,
                factor: self.factor,
                window_ms: self.window_ms,
            },
            simulation: settings::SimulationSettings {
                offered_rate: self.offered_rate,
                peer_capacities: self.peer_capacities,
                queue_depth: self.queue_depth,
                duration_secs: self.duration_secs,
            },
            log_json: self.log_json,
            report_json: self.report_json,
        }
    }
}
