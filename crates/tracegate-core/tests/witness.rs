// crates/tracegate-core/tests/witness.rs
// ============================================================================
// Module: Witness Resolution Tests
// Description: Earliest-witness selection and deterministic tie-breaking.
// ============================================================================
//! ## Overview
//! Checks witness minimality and the strict primary tie-break: class
//! precedence, then lexicographic code order, then emission order.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use tracegate_core::FailureClass;
use tracegate_core::Violation;
use tracegate_core::codes;
use tracegate_core::core::witness::resolve_witness;

fn violation(code: &str, class: FailureClass, event_index: u64) -> Violation {
    Violation::new(code, class, event_index, format!("test violation {code}"))
}

#[test]
fn empty_union_resolves_to_none() {
    assert!(resolve_witness(&[]).is_none());
}

#[test]
fn witness_is_the_minimum_event_index() {
    let violations = vec![
        violation(codes::CONTRACT_TOOL_DENIED, FailureClass::Contract, 9),
        violation(codes::CONTRACT_SEQUENCE_NEVER_SEEN, FailureClass::Contract, 4),
        violation(codes::REFINEMENT_BASELINE_CALL_MISSING, FailureClass::Refinement, 12),
    ];
    let resolution = resolve_witness(&violations).expect("resolution");
    assert_eq!(resolution.witness_index, 4);
    assert_eq!(resolution.all_at_witness.len(), 1);
    assert!(violations.iter().all(|entry| entry.event_index >= resolution.witness_index));
}

#[test]
fn refinement_outranks_contract_at_the_witness() {
    let violations = vec![
        violation(codes::CONTRACT_TOOL_DENIED, FailureClass::Contract, 4),
        violation(codes::REFINEMENT_NEW_TOOL_NAME_FORBIDDEN, FailureClass::Refinement, 4),
    ];
    let resolution = resolve_witness(&violations).expect("resolution");
    assert_eq!(resolution.primary.code, codes::REFINEMENT_NEW_TOOL_NAME_FORBIDDEN);
    assert_eq!(resolution.all_at_witness.len(), 2);
}

#[test]
fn contract_outranks_tooling_at_the_witness() {
    let violations = vec![
        violation(codes::FIXTURE_EXHAUSTED, FailureClass::Tooling, 4),
        violation(codes::CONTRACT_TOOL_DENIED, FailureClass::Contract, 4),
    ];
    let resolution = resolve_witness(&violations).expect("resolution");
    assert_eq!(resolution.primary.code, codes::CONTRACT_TOOL_DENIED);
}

#[test]
fn lexicographic_code_order_breaks_class_ties() {
    let violations = vec![
        violation(codes::REFINEMENT_NEW_TOOL_NAME_FORBIDDEN, FailureClass::Refinement, 4),
        violation(codes::REFINEMENT_EXTRA_TOOL_CALL, FailureClass::Refinement, 4),
    ];
    let resolution = resolve_witness(&violations).expect("resolution");
    assert_eq!(resolution.primary.code, codes::REFINEMENT_EXTRA_TOOL_CALL);
}

#[test]
fn emission_order_is_the_final_tie_break() {
    let mut first = violation(codes::CONTRACT_TOOL_DENIED, FailureClass::Contract, 4);
    first.message = "first".to_string();
    let mut second = violation(codes::CONTRACT_TOOL_DENIED, FailureClass::Contract, 4);
    second.message = "second".to_string();
    let resolution = resolve_witness(&[first, second]).expect("resolution");
    assert_eq!(resolution.primary.message, "first");
}

#[test]
fn resolution_is_reproducible() {
    let violations = vec![
        violation(codes::CONTRACT_TOOL_DENIED, FailureClass::Contract, 4),
        violation(codes::REFINEMENT_EXTRA_TOOL_CALL, FailureClass::Refinement, 4),
        violation(codes::FIXTURE_EXHAUSTED, FailureClass::Tooling, 4),
    ];
    let first = resolve_witness(&violations).expect("first");
    let second = resolve_witness(&violations).expect("second");
    assert_eq!(first, second);
}
