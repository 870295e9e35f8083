//! Base + weight capacity allocation.

use fleet_core::{Allocation, CapacityClass, ClassUnits};
use tracing::debug;

/// Split `target` units across `classes`.
///
/// The returned allocation lists every class in input order and its units
/// always sum to `target` for a validated class list (non-empty, some
/// weight). While bases are being shrunk no class gets more than its
/// base; otherwise rounding leftovers go to the class with the largest
/// weight, ties to the earliest class.
pub fn allocate(target: u32, classes: &[CapacityClass]) -> Allocation {
    if classes.is_empty() {
        return Allocation::default();
    }

    let total_base: u64 = classes.iter().map(|c| u64::from(c.base)).sum();
    let bases: Vec<u64> = classes.iter().map(|c| u64::from(c.base)).collect();
    let mut units = vec![0u64; classes.len()];

    if u64::from(target) < total_base {
        // Target below the guaranteed floor: shrink every base by the same ratio.
        shrink_bases(u64::from(target), &bases, &mut units);
        debug!(target, total_base, "target below summed bases, bases reduced");
    } else {
        units.copy_from_slice(&bases);
        let remaining = u64::from(target) - total_base;
        let weights: Vec<u64> = classes.iter().map(|c| u64::from(c.weight)).collect();
        if weights.iter().all(|w| *w == 0) {
            units[0] += remaining;
        } else {
            distribute(remaining, &weights, &mut units);
        }
    }

    let allocation = Allocation {
        classes: classes
            .iter()
            .zip(units)
            .map(|(class, n)| ClassUnits {
                class: class.name.clone(),
                units: n as u32,
            })
            .collect(),
    };
    debug!(target, allocation = ?allocation.classes, "capacity allocated");
    allocation
}

/// Give every class `target * base / total_base` units, rounded by largest
/// remainder (ties to the earliest class), so no class exceeds its base.
fn shrink_bases(target: u64, bases: &[u64], units: &mut [u64]) {
    let total: u64 = bases.iter().sum();
    if target == 0 || total == 0 {
        return;
    }

    let mut given = 0;
    for (slot, base) in units.iter_mut().zip(bases) {
        *slot = target * base / total;
        given += *slot;
    }

    let mut order: Vec<usize> = (0..bases.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(target * bases[i] % total));
    for &i in order.iter().take((target - given) as usize) {
        units[i] += 1;
    }
}

/// Add `amount` to `units` proportionally to `shares`.
///
/// Floors each proportional share, then hands the whole leftover to the
/// largest share (first one on ties). `shares` must not sum to zero.
fn distribute(amount: u64, shares: &[u64], units: &mut [u64]) {
    let total: u64 = shares.iter().sum();
    if amount == 0 || total == 0 {
        return;
    }

    let mut given = 0;
    for (slot, share) in units.iter_mut().zip(shares) {
        let portion = amount * share / total;
        *slot += portion;
        given += portion;
    }

    let leftover = amount - given;
    if leftover > 0 {
        let mut largest = 0;
        for (i, share) in shares.iter().enumerate() {
            if *share > shares[largest] {
                largest = i;
            }
        }
        units[largest] += leftover;
    }
}

/// Order in which other classes absorb a shortfall in class `failed`.
///
/// Lower-priority classes come first, then the list wraps to the
/// guaranteed class at index 0 and works forward.
pub fn fallback_order(len: usize, failed: usize) -> impl Iterator<Item = usize> {
    (failed + 1..len).chain(0..failed.min(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::default_capacity_classes;

    fn classes() -> Vec<CapacityClass> {
        vec![
            CapacityClass::new("guaranteed", 1, 4),
            CapacityClass::new("spot", 4, 0),
        ]
    }

    #[test]
    fn base_then_weighted_remainder() {
        let alloc = allocate(10, &classes());
        assert_eq!(alloc.units("guaranteed"), 5);
        assert_eq!(alloc.units("spot"), 5);
        assert_eq!(alloc.total(), 10);
    }

    #[test]
    fn exact_base_fills_only_guaranteed() {
        let alloc = allocate(4, &classes());
        assert_eq!(alloc.units("guaranteed"), 4);
        assert_eq!(alloc.units("spot"), 0);
    }

    #[test]
    fn target_below_base_is_clamped_to_target() {
        let alloc = allocate(1, &classes());
        assert_eq!(alloc.units("guaranteed"), 1);
        assert_eq!(alloc.units("spot"), 0);
    }

    #[test]
    fn bases_shrink_proportionally() {
        let classes = vec![
            CapacityClass::new("a", 1, 6),
            CapacityClass::new("b", 1, 2),
            CapacityClass::new("c", 1, 0),
        ];
        let alloc = allocate(4, &classes);
        assert_eq!(alloc.units("a"), 3);
        assert_eq!(alloc.units("b"), 1);
        assert_eq!(alloc.units("c"), 0);

        let alloc = allocate(5, &classes);
        // 3.75 and 1.25: the larger remainder takes the leftover.
        assert_eq!(alloc.units("a"), 4);
        assert_eq!(alloc.units("b"), 1);
    }

    #[test]
    fn equal_bases_share_leftover_in_declaration_order() {
        let classes = vec![
            CapacityClass::new("a", 1, 1),
            CapacityClass::new("b", 1, 1),
            CapacityClass::new("c", 1, 1),
        ];
        let alloc = allocate(2, &classes);
        assert_eq!(alloc.units("a"), 1);
        assert_eq!(alloc.units("b"), 1);
        assert_eq!(alloc.units("c"), 0);
    }

    #[test]
    fn leftover_follows_largest_remainder_not_largest_base() {
        // 7 * [5, 3, 2] / 10 = 3.5, 2.1, 1.4 → floors 3, 2, 1 and one left.
        let classes = vec![
            CapacityClass::new("a", 1, 5),
            CapacityClass::new("b", 1, 3),
            CapacityClass::new("c", 1, 2),
        ];
        let alloc = allocate(7, &classes);
        assert_eq!(alloc.units("a"), 4);
        assert_eq!(alloc.units("b"), 2);
        assert_eq!(alloc.units("c"), 1);
    }

    #[test]
    fn weight_ties_go_to_first_class() {
        let classes = vec![
            CapacityClass::new("a", 2, 0),
            CapacityClass::new("b", 2, 0),
        ];
        let alloc = allocate(3, &classes);
        assert_eq!(alloc.units("a"), 2);
        assert_eq!(alloc.units("b"), 1);
    }

    #[test]
    fn zero_target_allocates_nothing() {
        let alloc = allocate(0, &classes());
        assert_eq!(alloc.total(), 0);
        assert_eq!(alloc.classes.len(), 2);
    }

    #[test]
    fn output_keeps_priority_order() {
        let alloc = allocate(7, &classes());
        let names: Vec<_> = alloc.classes.iter().map(|c| c.class.as_str()).collect();
        assert_eq!(names, vec!["guaranteed", "spot"]);
    }

    #[test]
    fn total_always_matches_target() {
        let shapes = vec![
            default_capacity_classes(),
            vec![
                CapacityClass::new("a", 3, 2),
                CapacityClass::new("b", 5, 1),
                CapacityClass::new("c", 0, 3),
            ],
            vec![CapacityClass::new("solo", 1, 0)],
            vec![
                CapacityClass::new("a", 0, 7),
                CapacityClass::new("b", 1, 0),
            ],
        ];
        for classes in &shapes {
            for target in 0..=100 {
                let alloc = allocate(target, classes);
                assert_eq!(alloc.total(), target, "target {target} over {classes:?}");
            }
        }
    }

    #[test]
    fn no_class_exceeds_its_base_when_target_is_short() {
        let shapes = vec![
            vec![
                CapacityClass::new("a", 1, 3),
                CapacityClass::new("b", 1, 3),
            ],
            vec![
                CapacityClass::new("a", 1, 1),
                CapacityClass::new("b", 1, 1),
                CapacityClass::new("c", 1, 1),
            ],
            vec![
                CapacityClass::new("a", 1, 5),
                CapacityClass::new("b", 1, 3),
                CapacityClass::new("c", 1, 2),
            ],
        ];
        for classes in &shapes {
            let total_base: u32 = classes.iter().map(|c| c.base).sum();
            for target in 0..total_base {
                let alloc = allocate(target, classes);
                assert_eq!(alloc.total(), target);
                for class in classes {
                    assert!(
                        alloc.units(&class.name) <= class.base,
                        "class {} got {} units with base {} at target {target}",
                        class.name,
                        alloc.units(&class.name),
                        class.base
                    );
                }
            }
        }
    }

    #[test]
    fn fallback_tries_lower_priority_then_wraps_to_guaranteed() {
        assert_eq!(fallback_order(3, 0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(fallback_order(3, 1).collect::<Vec<_>>(), vec![2, 0]);
        assert_eq!(fallback_order(3, 2).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(fallback_order(1, 0).count(), 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn class_list() -> impl Strategy<Value = Vec<CapacityClass>> {
            prop::collection::vec((0u32..5, 0u32..6), 1..5).prop_map(|shapes| {
                shapes
                    .into_iter()
                    .enumerate()
                    .map(|(i, (weight, base))| CapacityClass::new(format!("c{i}"), weight, base))
                    .collect()
            })
        }

        proptest! {
            /// Property: units always sum to the target and respect bases.
            #[test]
            fn prop_allocation_matches_target(classes in class_list(), target in 0u32..200) {
                let alloc = allocate(target, &classes);
                prop_assert_eq!(alloc.total(), target);
                prop_assert_eq!(alloc.classes.len(), classes.len());

                let total_base: u32 = classes.iter().map(|c| c.base).sum();
                for class in &classes {
                    let units = alloc.units(&class.name);
                    if target < total_base {
                        prop_assert!(
                            units <= class.base,
                            "{} got {} over base {} at target {}",
                            class.name, units, class.base, target
                        );
                    } else {
                        prop_assert!(units >= class.base);
                    }
                }
            }
        }
    }
}
