//! Step-scaling policy engine.
//!
//! `evaluate` is a pure function of the sample, the rule set, the
//! cooldown window, and the clock. Calling it twice with the same inputs
//! yields the same result.

use fleet_core::{BacklogSample, ConfigResult, CooldownWindow, ScalingDecision, StepRule, Timestamp};
use tracing::debug;

use crate::rules::StepRules;

/// Result of evaluating one backlog sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Change the fleet size by `decision.delta`.
    Scale(ScalingDecision),
    /// Leave the fleet alone.
    NoOp(NoOpReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// The last applied adjustment is too recent.
    CoolingDown { remaining_secs: u64 },
    /// The sample fell in a dead zone between rules.
    NoMatchingRule,
    /// The matching rule asks for no change.
    ZeroDelta,
}

impl Evaluation {
    pub fn decision(&self) -> Option<ScalingDecision> {
        match self {
            Evaluation::Scale(d) => Some(*d),
            Evaluation::NoOp(_) => None,
        }
    }
}

/// Step-scaling policy over a validated rule set.
#[derive(Debug, Clone)]
pub struct StepPolicy {
    rules: StepRules,
}

impl StepPolicy {
    /// Build a policy, rejecting malformed or overlapping rules.
    pub fn new(configured: &[StepRule]) -> ConfigResult<Self> {
        Ok(Self {
            rules: StepRules::new(configured)?,
        })
    }

    pub fn rules(&self) -> &StepRules {
        &self.rules
    }

    /// Evaluate a sample against the rules and the cooldown window.
    pub fn evaluate(
        &self,
        sample: &BacklogSample,
        cooldown: &CooldownWindow,
        now: Timestamp,
    ) -> Evaluation {
        if cooldown.is_active(now) {
            let remaining_secs = cooldown.remaining(now);
            debug!(backlog = sample.value, remaining_secs, "cooldown active");
            return Evaluation::NoOp(NoOpReason::CoolingDown { remaining_secs });
        }

        let Some(rule) = self.rules.matching(sample.value) else {
            debug!(backlog = sample.value, "backlog in dead zone");
            return Evaluation::NoOp(NoOpReason::NoMatchingRule);
        };

        if rule.delta == 0 {
            return Evaluation::NoOp(NoOpReason::ZeroDelta);
        }

        debug!(
            backlog = sample.value,
            lower = ?rule.lower,
            upper = ?rule.upper,
            delta = rule.delta,
            "step rule matched"
        );
        Evaluation::Scale(ScalingDecision {
            delta: rule.delta,
            decided_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use fleet_core::default_step_rules;

    fn policy() -> StepPolicy {
        StepPolicy::new(&default_step_rules()).unwrap()
    }

    fn idle_cooldown() -> CooldownWindow {
        CooldownWindow::new(Duration::from_secs(200))
    }

    #[test]
    fn backlog_above_forty_adds_one() {
        let eval = policy().evaluate(&BacklogSample::new(45.0, 1_000), &idle_cooldown(), 1_000);
        assert_eq!(
            eval,
            Evaluation::Scale(ScalingDecision {
                delta: 1,
                decided_at: 1_000
            })
        );
    }

    #[test]
    fn backlog_above_hundred_adds_three() {
        let eval = policy().evaluate(&BacklogSample::new(250.0, 1_000), &idle_cooldown(), 1_000);
        assert_eq!(eval.decision().unwrap().delta, 3);
    }

    #[test]
    fn small_backlog_removes_one() {
        let eval = policy().evaluate(&BacklogSample::new(8.0, 1_000), &idle_cooldown(), 1_000);
        assert_eq!(eval.decision().unwrap().delta, -1);
    }

    #[test]
    fn dead_zone_is_no_op() {
        let eval = policy().evaluate(&BacklogSample::new(20.0, 1_000), &idle_cooldown(), 1_000);
        assert_eq!(eval, Evaluation::NoOp(NoOpReason::NoMatchingRule));
    }

    #[test]
    fn cooldown_blocks_matching_rule() {
        let mut cooldown = idle_cooldown();
        cooldown.reset(1_000);
        let eval = policy().evaluate(&BacklogSample::new(50.0, 1_100), &cooldown, 1_100);
        assert_eq!(
            eval,
            Evaluation::NoOp(NoOpReason::CoolingDown {
                remaining_secs: 100
            })
        );
    }

    #[test]
    fn cooldown_expires_at_duration() {
        let mut cooldown = idle_cooldown();
        cooldown.reset(1_000);
        let eval = policy().evaluate(&BacklogSample::new(50.0, 1_200), &cooldown, 1_200);
        assert_eq!(eval.decision().unwrap().delta, 1);
    }

    #[test]
    fn zero_delta_rule_is_no_op() {
        let policy = StepPolicy::new(&[StepRule::between(0.0, 10.0, 0)]).unwrap();
        let eval = policy.evaluate(&BacklogSample::new(5.0, 1), &idle_cooldown(), 1);
        assert_eq!(eval, Evaluation::NoOp(NoOpReason::ZeroDelta));
    }

    #[test]
    fn evaluation_is_idempotent() {
        let policy = policy();
        let sample = BacklogSample::new(120.0, 5_000);
        let mut cooldown = idle_cooldown();
        cooldown.reset(4_000);

        let first = policy.evaluate(&sample, &cooldown, 5_000);
        let second = policy.evaluate(&sample, &cooldown, 5_000);
        assert_eq!(first, second);
        assert_eq!(cooldown.last_adjustment_at, Some(4_000));
    }

    #[test]
    fn overlapping_rules_fail_construction() {
        assert!(
            StepPolicy::new(&[
                StepRule::between(0.0, 50.0, 1),
                StepRule::between(25.0, 75.0, 2),
            ])
            .is_err()
        );
    }
}
