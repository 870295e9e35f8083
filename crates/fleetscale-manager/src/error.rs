//! Fleet manager error types.
//!
//! None of these stop the control loop: a tick that hits one is skipped,
//! abandoned, or recorded as a partial success.

use thiserror::Error;

/// Errors raised by a compute platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform unreachable: {0}")]
    Unreachable(String),

    #[error("unknown capacity class: {0}")]
    UnknownClass(String),
}

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("metric unavailable: {0}")]
    MetricUnavailable(String),

    #[error("capacity shortfall: requested {requested} units, achieved {achieved}")]
    CapacityShortfall { requested: u32, achieved: u32 },

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("configuration error: {0}")]
    Config(#[from] fleet_core::ConfigError),
}

pub type FleetResult<T> = Result<T, FleetError>;
