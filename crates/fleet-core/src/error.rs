//! Configuration errors.
//!
//! Every variant is fatal at construction time; nothing in the running
//! control loop produces a `ConfigError`.

use thiserror::Error;

/// Result type alias for configuration parsing and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("min_instances must be at least 1")]
    ZeroMinInstances,

    #[error("min_instances ({min}) exceeds max_instances ({max})")]
    InstanceRange { min: u32, max: u32 },

    #[error("invalid duration for `{field}`: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("`{field}` must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("unsupported metric statistic: {0:?} (only \"max\" is recognized)")]
    UnsupportedStatistic(String),

    #[error("step rule #{index} has neither a lower nor an upper bound")]
    UnboundedStep { index: usize },

    #[error("step rule #{index} has an invalid bound: {value}")]
    InvalidBound { index: usize, value: f64 },

    #[error("step rule [{lower:?}, {upper:?}) is empty")]
    EmptyStep {
        lower: Option<f64>,
        upper: Option<f64>,
    },

    #[error("step rules [{a_lower:?}, {a_upper:?}) and [{b_lower:?}, {b_upper:?}) overlap")]
    OverlappingSteps {
        a_lower: Option<f64>,
        a_upper: Option<f64>,
        b_lower: Option<f64>,
        b_upper: Option<f64>,
    },

    #[error("at least one capacity class is required")]
    NoCapacityClasses,

    #[error("duplicate capacity class: {0}")]
    DuplicateClass(String),

    #[error("capacity class name must not be empty")]
    EmptyClassName,

    #[error("at least one capacity class must have a non-zero weight")]
    ZeroTotalWeight,
}
