// crates/tracegate-core/tests/proptest_canonical.rs
// ============================================================================
// Module: Canonicalization Property Tests
// Description: Property tests for canonical hashing and witness invariants.
// Purpose: Detect determinism violations across wide input ranges.
// ============================================================================

//! Property-based tests for canonicalization and witness invariants.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use serde_json::Value;
use tracegate_core::CanonicalNormalizer;
use tracegate_core::FailureClass;
use tracegate_core::Violation;
use tracegate_core::core::witness::resolve_witness;
use tracegate_core::hashing::canonical_json_bytes;

fn json_value_strategy(max_depth: u32) -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|v| Value::Number(v.into())),
        any::<f64>()
            .prop_filter("finite", |v| v.is_finite())
            .prop_map(|v| serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)),
        "[ -~]{0,12}".prop_map(Value::String),
    ];

    leaf.prop_recursive(max_depth, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0 .. 4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0 .. 4).prop_map(|map| {
                let mut object = serde_json::Map::new();
                for (key, value) in map {
                    object.insert(key, value);
                }
                Value::Object(object)
            }),
        ]
    })
}

fn violation_strategy() -> impl Strategy<Value = Violation> {
    let class = prop_oneof![
        Just(FailureClass::Refinement),
        Just(FailureClass::Contract),
        Just(FailureClass::Tooling),
    ];
    ("[A-Z_]{4,24}", class, 1_u64 .. 64).prop_map(|(code, failure_class, event_index)| {
        Violation::new(&code, failure_class, event_index, "generated")
    })
}

proptest! {
    #[test]
    fn canonical_serialization_is_idempotent(value in json_value_strategy(3)) {
        let once = canonical_json_bytes(&value).expect("first pass");
        let reparsed: Value = serde_json::from_slice(&once).expect("canonical parses");
        let twice = canonical_json_bytes(&reparsed).expect("second pass");
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn strip_is_idempotent(value in json_value_strategy(3)) {
        let normalizer = CanonicalNormalizer::without_redaction();
        let once = normalizer.strip(&value);
        let twice = normalizer.strip(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn stable_hash_is_invariant_under_volatile_keys(value in json_value_strategy(2)) {
        let normalizer = CanonicalNormalizer::without_redaction();
        let mut wrapped = serde_json::Map::new();
        wrapped.insert("payload".to_string(), value);
        let mut with_volatile = wrapped.clone();
        with_volatile.insert("rel_ms".to_string(), Value::from(123));
        with_volatile.insert("run_id".to_string(), Value::String("r-9".to_string()));
        with_volatile.insert("timestamp".to_string(), Value::from(999));

        let clean = normalizer.stable_hash(&Value::Object(wrapped)).expect("clean");
        let noisy = normalizer.stable_hash(&Value::Object(with_volatile)).expect("noisy");
        prop_assert_eq!(clean, noisy);
    }

    #[test]
    fn witness_is_never_later_than_any_violation(violations in prop::collection::vec(violation_strategy(), 1 .. 16)) {
        let resolution = resolve_witness(&violations).expect("non-empty union resolves");
        for violation in &violations {
            prop_assert!(resolution.witness_index <= violation.event_index);
        }
        prop_assert!(
            violations.iter().any(|violation| violation.event_index == resolution.witness_index)
        );
    }

    #[test]
    fn primary_selection_is_stable_under_repeats(violations in prop::collection::vec(violation_strategy(), 1 .. 16)) {
        let first = resolve_witness(&violations).expect("first");
        let second = resolve_witness(&violations).expect("second");
        prop_assert_eq!(first, second);
    }
}
