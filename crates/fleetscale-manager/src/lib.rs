//! fleetscale-manager — the control loop that owns the fleet.
//!
//! # Tick
//!
//! ```text
//! Idle ──tick──► Evaluating
//!                  ├── read_backlog(source_id)   (unavailable → Idle)
//!                  ├── StepPolicy::evaluate      (no-op → Idle)
//!                  ▼
//!                Adjusting
//!                  ├── new = clamp(current + delta, min, max)  (== current → Idle)
//!                  ├── allocate(new, classes)
//!                  ├── set_class_capacity per class, shortfall → fallback classes
//!                  └── record size, reset cooldown ──► Idle
//! ```
//!
//! `FleetState` and the cooldown window live inside [`FleetManager`] and
//! are only reachable through `&mut self`, so one tick at a time is a
//! property of the type, not a convention. The run loop awaits each tick
//! to completion before waiting for the next interval.

pub mod error;
pub mod manager;
pub mod platform;

pub use error::{FleetError, FleetResult, PlatformError};
pub use manager::{FleetManager, TickOutcome};
pub use platform::{CapacityOutcome, ComputePlatform, PlatformFuture};
