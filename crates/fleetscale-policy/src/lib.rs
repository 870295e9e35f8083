//! fleetscale-policy — step scaling on a backlog metric.
//!
//! Maps a backlog sample to a fleet-size delta using ordered,
//! non-overlapping step rules, and refuses to decide anything while the
//! cooldown window from the last applied adjustment is still open.
//!
//! # Step Rules
//!
//! ```text
//! configured                 normalized
//! { upper: 10,  -1 }   →     [-inf, 10)  -1
//! { lower: 40,  +1 }   →     [40,  100)  +1
//! { lower: 100, +3 }   →     [100, inf)  +3
//! ```
//!
//! Open-ended thresholds are closed at the next threshold in the same
//! direction before the overlap check, so a staircase of `lower`-only
//! steps is well-formed. Values in `[10, 40)` match nothing and produce
//! no change.
//!
//! The engine is pure: it never mutates the cooldown window. The fleet
//! manager resets it only when a decision is actually applied.

pub mod engine;
pub mod rules;

pub use engine::{Evaluation, NoOpReason, StepPolicy};
pub use rules::StepRules;
