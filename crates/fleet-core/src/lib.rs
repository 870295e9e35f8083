//! fleet-core — shared types and configuration for fleetscale.
//!
//! Holds the data model the control loop passes around (backlog samples,
//! step rules, cooldown windows, fleet state, capacity classes) and the
//! `fleet.toml` parser that turns a raw, mostly-optional config file into
//! validated [`FleetSettings`].

pub mod config;
pub mod error;
pub mod types;

pub use config::{FleetConfig, FleetSettings, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
