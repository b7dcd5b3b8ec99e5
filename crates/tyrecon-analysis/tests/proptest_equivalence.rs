//! Property-based tests for the equivalence engine.
//!
//! These tests verify the partition invariants:
//! - find is idempotent and agrees with the immutable representative lookup
//! - the partition is reflexive, symmetric and transitive after every merge
//! - the final partition does not depend on merge order
//! - the survivor of a class is always its lowest member

use proptest::prelude::*;
use std::collections::BTreeSet;

use tyrecon_analysis::{ConstraintKind, TypeArena, UseSite};
use tyrecon_core::{ClassId, TypeVarId};

// =============================================================================
// Generators
// =============================================================================

fn arb_merges() -> impl Strategy<Value = (u32, Vec<(u32, u32)>)> {
    (2u32..24).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..32)))
}

fn arena_with(n: u32) -> TypeArena {
    let mut arena = TypeArena::new();
    for i in 0..n {
        arena.new_variable(UseSite::Storage {
            name: format!("R{i}"),
        });
    }
    arena
}

fn partition(arena: &TypeArena) -> BTreeSet<Vec<TypeVarId>> {
    arena
        .live_classes()
        .map(|c| c.members().to_vec())
        .collect()
}

// =============================================================================
// Union-Find Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// find(find(x)) == find(x) at every step.
    #[test]
    fn find_is_idempotent((n, merges) in arb_merges()) {
        let mut arena = arena_with(n);
        for (a, b) in merges {
            arena.unify(TypeVarId::new(a), TypeVarId::new(b)).unwrap();
            for x in 0..n {
                let once = arena.find(ClassId::new(x)).unwrap();
                prop_assert_eq!(arena.find(once).unwrap(), once);
                prop_assert_eq!(arena.representative(ClassId::new(x)), Some(once));
            }
        }
    }

    /// Same-class is an equivalence relation.
    #[test]
    fn partition_is_equivalence_relation((n, merges) in arb_merges()) {
        let mut arena = arena_with(n);
        for (a, b) in merges {
            arena.unify(TypeVarId::new(a), TypeVarId::new(b)).unwrap();
        }
        let same = |x: u32, y: u32| {
            arena.class_of(TypeVarId::new(x)) == arena.class_of(TypeVarId::new(y))
        };
        for x in 0..n {
            prop_assert!(same(x, x));
            for y in 0..n {
                prop_assert_eq!(same(x, y), same(y, x));
                for z in 0..n {
                    if same(x, y) && same(y, z) {
                        prop_assert!(same(x, z));
                    }
                }
            }
        }
    }

    /// Reversing the merge sequence yields the same classes with the same ids.
    #[test]
    fn merge_order_is_irrelevant((n, merges) in arb_merges()) {
        let mut forward = arena_with(n);
        for (a, b) in &merges {
            forward.unify(TypeVarId::new(*a), TypeVarId::new(*b)).unwrap();
        }
        let mut backward = arena_with(n);
        for (a, b) in merges.iter().rev() {
            backward.unify(TypeVarId::new(*b), TypeVarId::new(*a)).unwrap();
        }

        prop_assert_eq!(partition(&forward), partition(&backward));
        prop_assert_eq!(forward.live_class_ids(), backward.live_class_ids());
    }

    /// The surviving class id is the lowest member id.
    #[test]
    fn survivor_is_lowest_member((n, merges) in arb_merges()) {
        let mut arena = arena_with(n);
        for (a, b) in merges {
            arena.unify(TypeVarId::new(a), TypeVarId::new(b)).unwrap();
        }
        for class in arena.live_classes() {
            let lowest = class.members().iter().min().copied().unwrap();
            prop_assert_eq!(class.id().0, lowest.0);
            prop_assert!(class.members().windows(2).all(|w| w[0] < w[1]));
        }
    }

    /// Constraints stay in recording order whatever the merge order.
    #[test]
    fn constraints_keep_recording_order((n, merges) in arb_merges()) {
        let mut arena = arena_with(n);
        for x in 0..n {
            arena
                .add_constraint(TypeVarId::new(x), x as usize, ConstraintKind::Size { width: 1 })
                .unwrap();
        }
        for (a, b) in merges {
            arena.unify(TypeVarId::new(a), TypeVarId::new(b)).unwrap();
        }
        let mut total = 0;
        for class in arena.live_classes() {
            let seqs: Vec<u64> = class.constraints().iter().map(|c| c.seq).collect();
            prop_assert!(seqs.windows(2).all(|w| w[0] < w[1]));
            total += seqs.len();
        }
        prop_assert_eq!(total, n as usize);
    }
}
