use std::fmt;

/// Main error type for backflow
#[derive(Debug)]
pub enum BackflowError {
    /// Controller configuration errors, raised only at construction
    Config(ConfigError),

    /// Simulated peer link errors
    Transport(String),

    /// Simulation load profile errors
    Simulation(String),

    /// System I/O errors
    Io(std::io::Error),

    /// Report serialization errors
    Serialization(serde_json::Error),
}

/// One variant per violated configuration rule
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Exactly three parameters are accepted
    WrongParameterCount { expected: usize, found: usize },

    /// A required parameter key is absent
    MissingParameter(&'static str),

    /// A parameter value is not a finite number
    InvalidNumber { key: &'static str, value: String },

    /// High ratio must be in (0, 1]
    HighRatioOutOfRange(f64),

    /// Low ratio must be in (0, 1]
    LowRatioOutOfRange(f64),

    /// High ratio must be strictly greater than low ratio
    HighNotAboveLow { high: f64, low: f64 },

    /// Factor must be at least 1
    FactorBelowOne(f64),

    /// Window duration must be positive
    ZeroWindow,
}

impl fmt::Display for BackflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackflowError::Config(err) => write!(f, "Configuration error: {}", err),
            BackflowError::Transport(msg) => write!(f, "Transport error: {}", msg),
            BackflowError::Simulation(msg) => write!(f, "Simulation error: {}", msg),
            BackflowError::Io(err) => write!(f, "I/O error: {}", err),
            BackflowError::Serialization(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::WrongParameterCount { expected, found } => write!(
                f,
                "expected exactly {} back-pressure parameters, found {}",
                expected, found
            ),
            ConfigError::MissingParameter(key) => write!(f, "missing parameter '{}'", key),
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "parameter '{}' is not a number: '{}'", key, value)
            }
            ConfigError::HighRatioOutOfRange(value) => write!(
                f,
                "high ratio must be bigger than 0 and smaller or equal to 1, got {}",
                value
            ),
            ConfigError::LowRatioOutOfRange(value) => write!(
                f,
                "low ratio must be bigger than 0 and smaller or equal to 1, got {}",
                value
            ),
            ConfigError::HighNotAboveLow { high, low } => write!(
                f,
                "high ratio ({}) must be bigger than low ratio ({})",
                high, low
            ),
            ConfigError::FactorBelowOne(value) => {
                write!(f, "factor must be bigger or equal to 1, got {}", value)
            }
            ConfigError::ZeroWindow => write!(f, "window duration must be positive"),
        }
    }
}

impl std::error::Error for BackflowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackflowError::Config(err) => Some(err),
            BackflowError::Io(err) => Some(err),
            BackflowError::Serialization(err) => Some(err),
            BackflowError::Transport(_) | BackflowError::Simulation(_) => None,
        }
    }
}

impl std::error::Error for ConfigError {}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, BackflowError>;

impl BackflowError {
    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            BackflowError::Config(_) => "configuration_error",
            BackflowError::Transport(_) => "transport_error",
            BackflowError::Simulation(_) => "simulation_error",
            BackflowError::Io(_) => "io_error",
            BackflowError::Serialization(_) => "serialization_error",
        }
    }
}

impl From<ConfigError> for BackflowError {
    fn from(err: ConfigError) -> Self {
        BackflowError::Config(err)
    }
}

impl From<std::io::Error> for BackflowError {
    fn from(err: std::io::Error) -> Self {
        BackflowError::Io(err)
    }
}

impl From<serde_json::Error> for BackflowError {
    fn from(err: serde_json::Error) -> Self {
        BackflowError::Serialization(err)
    }
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::BackflowError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::BackflowError::Transport(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: BackflowError = ConfigError::FactorBelowOne(0.5).into();
        assert_eq!(
            err.to_string(),
            "Configuration error: factor must be bigger or equal to 1, got 0.5"
        );

        let err: BackflowError = ConfigError::HighNotAboveLow { high: 0.8, low: 0.9 }.into();
        assert!(err.to_string().contains("high ratio (0.8)"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: BackflowError = io_err.into();
        assert!(matches!(err, BackflowError::Io(_)));
        assert_eq!(err.error_type(), "io_error");
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;
        let err: BackflowError = ConfigError::ZeroWindow.into();
        assert!(err.source().is_some());
        let err = transport_error!("peer {} unreachable", "node-1");
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "Transport error: peer node-1 unreachable");
    }
}
