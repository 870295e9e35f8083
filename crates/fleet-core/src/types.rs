//! Domain types for the fleetscale control loop.
//!
//! Samples and decisions are produced once per tick and thrown away;
//! `FleetState` and `CooldownWindow` live as long as the fleet and are
//! mutated only by the fleet manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unix timestamp in seconds.
pub type Timestamp = u64;

// ── Backlog ───────────────────────────────────────────────────────

/// Maximum backlog depth observed over one sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacklogSample {
    /// Pending items (visible messages) in the work queue.
    pub value: f64,
    /// When the window closed.
    pub timestamp: Timestamp,
}

impl BacklogSample {
    pub fn new(value: f64, timestamp: Timestamp) -> Self {
        Self { value, timestamp }
    }

    /// A sample is usable when its value is a finite, non-negative number.
    pub fn is_valid(&self) -> bool {
        self.value.is_finite() && self.value >= 0.0
    }
}

// ── Step rules ────────────────────────────────────────────────────

/// Maps a backlog range `[lower, upper)` to a fleet-size delta.
///
/// A missing `lower` is open downward, a missing `upper` is open upward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
    /// Change in instance count when this rule matches.
    #[serde(alias = "change")]
    pub delta: i32,
}

impl StepRule {
    /// Rule open-ended upward from `lower`.
    pub fn above(lower: f64, delta: i32) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
            delta,
        }
    }

    /// Rule open-ended downward below `upper`.
    pub fn below(upper: f64, delta: i32) -> Self {
        Self {
            lower: None,
            upper: Some(upper),
            delta,
        }
    }

    /// Rule bounded on both sides.
    pub fn between(lower: f64, upper: f64, delta: i32) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
            delta,
        }
    }

    /// Whether `value` falls in `[lower, upper)`.
    pub fn contains(&self, value: f64) -> bool {
        self.lower.is_none_or(|lo| value >= lo) && self.upper.is_none_or(|hi| value < hi)
    }
}

/// Default step set: shrink below 10 queued, grow by 1 from 40 and by 3 from 100.
pub fn default_step_rules() -> Vec<StepRule> {
    vec![
        StepRule::below(10.0, -1),
        StepRule::above(40.0, 1),
        StepRule::above(100.0, 3),
    ]
}

/// A fleet-size change derived from one backlog sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub delta: i32,
    pub decided_at: Timestamp,
}

// ── Cooldown ──────────────────────────────────────────────────────

/// Minimum spacing between two applied adjustments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownWindow {
    /// `None` until the first adjustment is applied.
    pub last_adjustment_at: Option<Timestamp>,
    pub duration: Duration,
}

impl CooldownWindow {
    pub fn new(duration: Duration) -> Self {
        Self {
            last_adjustment_at: None,
            duration,
        }
    }

    /// True while `now - last_adjustment_at < duration`.
    pub fn is_active(&self, now: Timestamp) -> bool {
        match self.last_adjustment_at {
            Some(last) => now.saturating_sub(last) < self.duration.as_secs(),
            None => false,
        }
    }

    /// Seconds left before the window closes.
    pub fn remaining(&self, now: Timestamp) -> u64 {
        match self.last_adjustment_at {
            Some(last) => self
                .duration
                .as_secs()
                .saturating_sub(now.saturating_sub(last)),
            None => 0,
        }
    }

    /// Record an applied adjustment.
    pub fn reset(&mut self, now: Timestamp) {
        self.last_adjustment_at = Some(now);
    }
}

// ── Fleet ─────────────────────────────────────────────────────────

/// Instance count of the fleet and its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetState {
    pub current_size: u32,
    pub min_size: u32,
    pub max_size: u32,
}

impl FleetState {
    /// Start a fleet at its minimum size.
    pub fn new(min_size: u32, max_size: u32) -> Self {
        Self {
            current_size: min_size,
            min_size,
            max_size,
        }
    }

    /// `clamp(current + delta, min, max)`.
    pub fn target_for(&self, delta: i32) -> u32 {
        let raw = i64::from(self.current_size) + i64::from(delta);
        self.clamp(raw)
    }

    /// Clamp an arbitrary count into `[min, max]`.
    pub fn clamp(&self, size: i64) -> u32 {
        size.clamp(i64::from(self.min_size), i64::from(self.max_size)) as u32
    }
}

/// Phase of the fleet manager's control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    #[default]
    Idle,
    Evaluating,
    Adjusting,
}

// ── Capacity ──────────────────────────────────────────────────────

/// A pool of compute capacity with its own cost/availability profile.
///
/// Declaration order is priority order: the first class is the
/// guaranteed baseline that fallback placement ends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityClass {
    pub name: String,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub base: u32,
}

impl CapacityClass {
    pub fn new(name: impl Into<String>, weight: u32, base: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            base,
        }
    }
}

/// One guaranteed class with a base of four, plus interruptible
/// capacity weighted four to one for everything above it.
pub fn default_capacity_classes() -> Vec<CapacityClass> {
    vec![
        CapacityClass::new("guaranteed", 1, 4),
        CapacityClass::new("spot", 4, 0),
    ]
}

/// Units assigned to one capacity class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassUnits {
    pub class: String,
    pub units: u32,
}

/// Per-class unit counts, in class priority order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Allocation {
    pub classes: Vec<ClassUnits>,
}

impl Allocation {
    /// Units assigned to `class`, zero when the class is absent.
    pub fn units(&self, class: &str) -> u32 {
        self.classes
            .iter()
            .find(|c| c.class == class)
            .map(|c| c.units)
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.classes.iter().map(|c| c.units).sum()
    }

    /// Set the units for `class`, appending it if absent.
    pub fn set(&mut self, class: &str, units: u32) {
        match self.classes.iter_mut().find(|c| c.class == class) {
            Some(entry) => entry.units = units,
            None => self.classes.push(ClassUnits {
                class: class.to_string(),
                units,
            }),
        }
    }
}

// ── Status ────────────────────────────────────────────────────────

/// Passive snapshot of the fleet for external inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetStatus {
    pub fleet: String,
    pub current_size: u32,
    pub min_size: u32,
    pub max_size: u32,
    /// Delta of the last applied decision.
    pub last_delta: Option<i32>,
    pub last_adjustment_at: Option<Timestamp>,
    /// Value of the last consumed backlog sample.
    pub last_backlog: Option<f64>,
    /// Units the platform reports as actually running, per class.
    pub class_units: Allocation,
    /// Units missing after the last adjustment, if it fell short.
    pub shortfall: u32,
    /// Last non-fatal error reported by the loop.
    pub last_error: Option<String>,
    pub phase: LoopPhase,
    /// Completed ticks since start.
    pub ticks: u64,
}
