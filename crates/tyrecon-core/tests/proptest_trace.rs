//! Property-based tests for trace ingestion.
//!
//! These tests verify that:
//! - well-formed builder traces are accepted and survive a JSON round trip
//! - a `Result` operand that does not point backwards is always rejected
//! - arbitrary JSON never panics the ingestor

use proptest::prelude::*;

use tyrecon_core::{
    BitwiseOp, CompareOp, Error, Operand, RecordKind, Trace, TraceBuilder, TraceRecord,
};

// =============================================================================
// Generators
// =============================================================================

#[derive(Debug, Clone)]
enum Step {
    Literal { value: i64, width: u8 },
    Load { base: usize, offset: i64, width: u8 },
    Store { base: usize, offset: i64, width: u8, value: usize },
    Index { base: usize, index: usize, stride: u32, width: u8 },
    Add { operand: usize, step: i64 },
    Compare { lhs: usize, rhs: usize, unsigned: bool },
    Xor { lhs: usize, rhs: usize, width: u8 },
    Call { target: usize, args: Vec<usize> },
    Assign { reg: u8 },
}

fn arb_width() -> impl Strategy<Value = u8> {
    prop_oneof![Just(1u8), Just(2), Just(4), Just(8)]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (any::<i64>(), arb_width()).prop_map(|(value, width)| Step::Literal { value, width }),
        (any::<usize>(), -64i64..64, arb_width())
            .prop_map(|(base, offset, width)| Step::Load { base, offset, width }),
        (any::<usize>(), -64i64..64, arb_width(), any::<usize>()).prop_map(
            |(base, offset, width, value)| Step::Store {
                base,
                offset,
                width,
                value
            }
        ),
        (any::<usize>(), any::<usize>(), 1u32..16, arb_width()).prop_map(
            |(base, index, stride, width)| Step::Index {
                base,
                index,
                stride,
                width
            }
        ),
        (any::<usize>(), -8i64..8).prop_map(|(operand, step)| Step::Add { operand, step }),
        (any::<usize>(), any::<usize>(), any::<bool>())
            .prop_map(|(lhs, rhs, unsigned)| Step::Compare { lhs, rhs, unsigned }),
        (any::<usize>(), any::<usize>(), arb_width())
            .prop_map(|(lhs, rhs, width)| Step::Xor { lhs, rhs, width }),
        (any::<usize>(), prop::collection::vec(any::<usize>(), 0..4))
            .prop_map(|(target, args)| Step::Call { target, args }),
        (0u8..8).prop_map(|reg| Step::Assign { reg }),
    ]
}

/// Builds a well-formed trace. Operand indices pick from the registers and
/// the results produced so far.
fn build(steps: &[Step]) -> TraceBuilder {
    let mut b = TraceBuilder::new();
    let mut pool: Vec<Operand> = (0..4).map(|i| Operand::storage(format!("R{i}"))).collect();
    let mut last_has_result = false;
    for step in steps {
        let pick = |i: usize| pool[i % pool.len()].clone();
        let produced = match step {
            Step::Literal { value, width } => Some(b.literal(*value, *width)),
            Step::Load {
                base,
                offset,
                width,
            } => Some(b.load(pick(*base), *offset, *width)),
            Step::Store {
                base,
                offset,
                width,
                value,
            } => {
                b.store(pick(*base), *offset, *width, pick(*value));
                None
            }
            Step::Index {
                base,
                index,
                stride,
                width,
            } => Some(b.index(pick(*base), pick(*index), 0, *stride, *width)),
            Step::Add { operand, step } => Some(b.add(pick(*operand), *step, 2)),
            Step::Compare { lhs, rhs, unsigned } => {
                let op = if *unsigned { CompareOp::Ult } else { CompareOp::Lt };
                Some(b.compare(op, pick(*lhs), pick(*rhs)))
            }
            Step::Xor { lhs, rhs, width } => {
                Some(b.bitwise(BitwiseOp::Xor, pick(*lhs), pick(*rhs), *width))
            }
            Step::Call { target, args } => {
                let args = args.iter().map(|a| pick(*a)).collect();
                Some(b.call(pick(*target), args, true))
            }
            Step::Assign { reg } => {
                if last_has_result {
                    b.assign(&format!("R{reg}"));
                }
                continue;
            }
        };
        last_has_result = produced.is_some();
        pool.extend(produced);
    }
    b
}

fn arb_steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(arb_step(), 0..40)
}

// =============================================================================
// Ingestion Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Builder output is always accepted, one operation per record.
    #[test]
    fn builder_traces_ingest(steps in arb_steps()) {
        let b = build(&steps);
        let records = b.records().len();
        let trace = b.build().unwrap();
        prop_assert_eq!(trace.len(), records);
        for (position, op) in trace.operations().iter().enumerate() {
            prop_assert_eq!(op.position, position);
        }
    }

    /// Records serialized to JSON ingest to the same trace.
    #[test]
    fn trace_survives_json_round_trip(steps in arb_steps()) {
        let b = build(&steps);
        let json = serde_json::to_string(b.records()).unwrap();
        let direct = Trace::ingest(b.records().to_vec()).unwrap();
        let parsed = Trace::from_json(&json).unwrap();
        prop_assert_eq!(parsed, direct);
    }

    /// A `Result` operand naming the current or a later position is rejected
    /// at the record that uses it.
    #[test]
    fn forward_result_reference_is_rejected(steps in arb_steps(), ahead in 0usize..8) {
        let mut records = build(&steps).records().to_vec();
        let position = records.len();
        let target = position + ahead;
        let mut bad = TraceRecord::new(0, RecordKind::Copy);
        bad.operands = vec![Operand::Result(target)];
        records.push(bad);

        let err = Trace::ingest(records).unwrap_err();
        let expected = matches!(
            err,
            Error::UnknownOperand { position: p, target: t } if p == position && t == target
        );
        prop_assert!(expected, "unexpected error: {}", err);
    }

    /// Referring to a store, which has no result, is rejected too.
    #[test]
    fn reference_to_store_is_rejected(steps in arb_steps()) {
        let mut b = build(&steps);
        b.store(Operand::storage("R0"), 0, 1, Operand::literal(1, 1));
        let store = b.records().len() - 1;
        b.copy(Operand::Result(store));
        let err = b.build().unwrap_err();
        let expected = matches!(
            err,
            Error::UnknownOperand { position, target } if position == store + 1 && target == store
        );
        prop_assert!(expected, "unexpected error: {}", err);
    }
}

// =============================================================================
// Robustness Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    /// Arbitrary text never panics the JSON ingestor.
    #[test]
    fn arbitrary_json_never_panics(s in ".*") {
        let _ = Trace::from_json(&s);
    }
}
