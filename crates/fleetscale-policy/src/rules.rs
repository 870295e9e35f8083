//! Step rule normalization and validation.
//!
//! A rule set is accepted only if, after closing open-ended thresholds,
//! no two `[lower, upper)` intervals intersect. Evaluation order never
//! masks a misconfiguration.

use std::cmp::Ordering;

use fleet_core::{ConfigError, ConfigResult, StepRule};

/// A validated, normalized step rule set sorted by lower bound.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepRules {
    rules: Vec<StepRule>,
}

impl StepRules {
    /// Normalize and validate a configured rule set.
    pub fn new(configured: &[StepRule]) -> ConfigResult<Self> {
        for (index, rule) in configured.iter().enumerate() {
            if rule.lower.is_none() && rule.upper.is_none() {
                return Err(ConfigError::UnboundedStep { index });
            }
            for value in [rule.lower, rule.upper].into_iter().flatten() {
                if !value.is_finite() || value < 0.0 {
                    return Err(ConfigError::InvalidBound { index, value });
                }
            }
        }

        let mut rules = normalize(configured);

        for rule in &rules {
            if let (Some(lo), Some(hi)) = (rule.lower, rule.upper)
                && lo >= hi
            {
                return Err(ConfigError::EmptyStep {
                    lower: rule.lower,
                    upper: rule.upper,
                });
            }
        }

        rules.sort_by(|a, b| lower_of(a).total_cmp(&lower_of(b)));

        for (i, a) in rules.iter().enumerate() {
            for b in &rules[i + 1..] {
                if overlaps(a, b) {
                    return Err(ConfigError::OverlappingSteps {
                        a_lower: a.lower,
                        a_upper: a.upper,
                        b_lower: b.lower,
                        b_upper: b.upper,
                    });
                }
            }
        }

        Ok(Self { rules })
    }

    /// First rule whose interval contains `value`, scanning in order.
    pub fn matching(&self, value: f64) -> Option<&StepRule> {
        self.rules.iter().find(|rule| rule.contains(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Close each open-ended threshold at its neighbour in the same direction.
///
/// `lower`-only rules run up to the next `lower`-only threshold;
/// `upper`-only rules start at the previous `upper`-only threshold.
/// Fully bounded rules are kept as written.
fn normalize(configured: &[StepRule]) -> Vec<StepRule> {
    let mut out: Vec<StepRule> = configured
        .iter()
        .filter(|r| r.lower.is_some() && r.upper.is_some())
        .copied()
        .collect();

    let mut ascending: Vec<StepRule> = configured
        .iter()
        .filter(|r| r.lower.is_some() && r.upper.is_none())
        .copied()
        .collect();
    ascending.sort_by(|a, b| lower_of(a).total_cmp(&lower_of(b)));
    for i in 0..ascending.len() {
        let next = ascending.get(i + 1).and_then(|r| r.lower);
        out.push(StepRule {
            upper: next,
            ..ascending[i]
        });
    }

    let mut descending: Vec<StepRule> = configured
        .iter()
        .filter(|r| r.lower.is_none() && r.upper.is_some())
        .copied()
        .collect();
    descending.sort_by(|a, b| upper_of(a).total_cmp(&upper_of(b)));
    for i in 0..descending.len() {
        let prev = i.checked_sub(1).and_then(|p| descending[p].upper);
        out.push(StepRule {
            lower: prev,
            ..descending[i]
        });
    }

    out
}

fn lower_of(rule: &StepRule) -> f64 {
    rule.lower.unwrap_or(f64::NEG_INFINITY)
}

fn upper_of(rule: &StepRule) -> f64 {
    rule.upper.unwrap_or(f64::INFINITY)
}

fn overlaps(a: &StepRule, b: &StepRule) -> bool {
    let start = lower_of(a).max(lower_of(b));
    let end = upper_of(a).min(upper_of(b));
    start.partial_cmp(&end) == Some(Ordering::Less)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::default_step_rules;

    #[test]
    fn default_rules_normalize_into_staircase() {
        let rules = StepRules::new(&default_step_rules()).unwrap();
        let normalized: Vec<_> = rules.iter().copied().collect();
        assert_eq!(
            normalized,
            vec![
                StepRule::below(10.0, -1),
                StepRule::between(40.0, 100.0, 1),
                StepRule::above(100.0, 3),
            ]
        );
    }

    #[test]
    fn upper_only_chain_normalizes_downward() {
        let rules = StepRules::new(&[StepRule::below(10.0, -1), StepRule::below(5.0, -2)]).unwrap();
        assert_eq!(rules.matching(2.0).unwrap().delta, -2);
        assert_eq!(rules.matching(7.0).unwrap().delta, -1);
        assert!(rules.matching(10.0).is_none());
    }

    #[test]
    fn no_value_matches_twice() {
        let rules = StepRules::new(&default_step_rules()).unwrap();
        for tenth in 0..2_000 {
            let value = tenth as f64 / 10.0;
            let hits = rules.iter().filter(|r| r.contains(value)).count();
            assert!(hits <= 1, "value {value} matched {hits} rules");
        }
    }

    #[test]
    fn gap_matches_nothing() {
        let rules = StepRules::new(&default_step_rules()).unwrap();
        assert!(rules.matching(10.0).is_none());
        assert!(rules.matching(25.0).is_none());
        assert!(rules.matching(39.99).is_none());
    }

    #[test]
    fn explicit_overlap_is_rejected() {
        let err = StepRules::new(&[
            StepRule::between(0.0, 50.0, 1),
            StepRule::between(40.0, 60.0, 2),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::OverlappingSteps { .. }));
    }

    #[test]
    fn opposing_open_ranges_overlap() {
        let err = StepRules::new(&[StepRule::below(50.0, -1), StepRule::above(40.0, 1)]).unwrap_err();
        assert!(matches!(err, ConfigError::OverlappingSteps { .. }));
    }

    #[test]
    fn open_range_swallowing_bounded_rule_is_rejected() {
        let err = StepRules::new(&[StepRule::above(40.0, 1), StepRule::between(60.0, 80.0, 2)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::OverlappingSteps { .. }));
    }

    #[test]
    fn duplicate_threshold_is_empty_step() {
        let err = StepRules::new(&[StepRule::above(40.0, 1), StepRule::above(40.0, 2)]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyStep { .. }));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = StepRules::new(&[StepRule::between(10.0, 5.0, 1)]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyStep { .. }));
    }

    #[test]
    fn unbounded_and_invalid_bounds_are_rejected() {
        let unbounded = StepRule {
            lower: None,
            upper: None,
            delta: 1,
        };
        assert!(matches!(
            StepRules::new(&[unbounded]),
            Err(ConfigError::UnboundedStep { index: 0 })
        ));
        assert!(matches!(
            StepRules::new(&[StepRule::above(f64::NAN, 1)]),
            Err(ConfigError::InvalidBound { .. })
        ));
        assert!(matches!(
            StepRules::new(&[StepRule::below(-3.0, 1)]),
            Err(ConfigError::InvalidBound { .. })
        ));
    }

    #[test]
    fn adjacent_bounded_rules_are_fine() {
        let rules = StepRules::new(&[
            StepRule::between(20.0, 30.0, 2),
            StepRule::between(10.0, 20.0, 1),
        ])
        .unwrap();
        assert_eq!(rules.iter().next().unwrap().lower, Some(10.0));
        assert_eq!(rules.matching(20.0).unwrap().delta, 2);
    }

    #[test]
    fn empty_rule_set_matches_nothing() {
        let rules = StepRules::new(&[]).unwrap();
        assert!(rules.is_empty());
        assert!(rules.matching(1_000.0).is_none());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn rule() -> impl Strategy<Value = StepRule> {
            (0u8..3, 0u32..200, 0u32..200, -3i32..=3).prop_map(|(kind, a, b, delta)| {
                let (a, b) = (f64::from(a), f64::from(b));
                match kind {
                    0 => StepRule::below(a, delta),
                    1 => StepRule::above(a, delta),
                    _ => StepRule::between(a.min(b), a.max(b), delta),
                }
            })
        }

        proptest! {
            /// Property: an accepted rule set never matches a value twice.
            #[test]
            fn prop_accepted_rules_are_disjoint(
                configured in prop::collection::vec(rule(), 1..5),
                values in prop::collection::vec(0.0f64..300.0, 1..50),
            ) {
                let Ok(rules) = StepRules::new(&configured) else {
                    return Ok(());
                };
                for value in values.into_iter().chain((0..300).map(f64::from)) {
                    let hits: Vec<_> = rules.iter().filter(|r| r.contains(value)).collect();
                    prop_assert!(hits.len() <= 1, "value {} matched {:?}", value, hits);
                    prop_assert_eq!(rules.matching(value), hits.first().copied());
                }
            }

            /// Property: a single rule always validates and keeps its delta.
            #[test]
            fn prop_single_rule_is_accepted(rule in rule()) {
                prop_assume!(rule.lower != rule.upper);
                let rules = StepRules::new(&[rule]).unwrap();
                prop_assert_eq!(rules.len(), 1);
                prop_assert_eq!(rules.iter().next().unwrap().delta, rule.delta);
            }
        }
    }
}
