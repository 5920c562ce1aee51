// crates/tracegate-core/tests/shrink.rs
// ============================================================================
// Module: Shrinker Tests
// Description: Bounded ddmin reduction over failing traces.
// ============================================================================
//! ## Overview
//! Verifies endpoint protection, failure-identity preservation through the
//! full pipeline, budget bounds, and the original-trace fallback.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use serde_json::json;
use tracegate_core::EventType;
use tracegate_core::FailureClass;
use tracegate_core::codes;
use tracegate_core::core::shrink::ShrinkError;
use tracegate_core::core::shrink::ddmin_shrink;
use tracegate_core::runtime::shrink_counterexample;

use common::call_trace;
use common::spec_from;
use common::tool_called;
use common::trace;

#[test]
fn shrink_drops_events_irrelevant_to_the_failure() {
    // The failure is simply "a denied tool appears"; everything else can go.
    let events = trace(vec![
        tool_called(0, "fetch_ticket"),
        tool_called(0, "log_event"),
        tool_called(0, "unsafe_export"),
        tool_called(0, "store_triage"),
    ]);
    let failure = |candidate: &[tracegate_core::TraceEvent]| {
        candidate.iter().any(|event| {
            event.payload.get("tool_name").and_then(serde_json::Value::as_str)
                == Some("unsafe_export")
        })
    };
    let outcome = ddmin_shrink(&events, failure, 5.0, 200).expect("shrink");

    assert!(outcome.stats.reduced());
    assert_eq!(outcome.events.first().map(|event| event.event_type), Some(EventType::RunStarted));
    assert_eq!(outcome.events.last().map(|event| event.event_type), Some(EventType::RunFinished));
    assert!(failure(&outcome.events));
    assert!(outcome.events.len() <= events.len());
}

#[test]
fn shrink_never_mutates_events() {
    let events = trace(vec![tool_called(0, "unsafe_export"), tool_called(0, "extra")]);
    let failure = |candidate: &[tracegate_core::TraceEvent]| {
        candidate.iter().any(|event| {
            event.payload.get("tool_name").and_then(serde_json::Value::as_str)
                == Some("unsafe_export")
        })
    };
    let outcome = ddmin_shrink(&events, failure, 5.0, 200).expect("shrink");
    for reduced in &outcome.events {
        let original = events
            .iter()
            .find(|event| event.seq == reduced.seq)
            .expect("reduced event exists in the original trace");
        assert_eq!(original, reduced);
    }
}

#[test]
fn shrink_falls_back_to_the_original_when_nothing_reduces() {
    let events = call_trace(&["unsafe_export"]);
    let failure = |candidate: &[tracegate_core::TraceEvent]| {
        // Every event is load-bearing for this predicate.
        candidate.len() == events.len()
    };
    let outcome = ddmin_shrink(&events, failure, 5.0, 200).expect("shrink");
    assert!(!outcome.stats.reduced());
    assert_eq!(outcome.events, events);
}

#[test]
fn shrink_rejects_invalid_bounds() {
    let events = call_trace(&["unsafe_export"]);
    let err = ddmin_shrink(&events, |_| true, 0.0, 10).unwrap_err();
    assert!(matches!(err, ShrinkError::InvalidBounds));
    let err = ddmin_shrink(&events, |_| true, 1.0, 0).unwrap_err();
    assert!(matches!(err, ShrinkError::InvalidBounds));
}

#[test]
fn shrink_rejects_a_passing_original() {
    let events = call_trace(&["fetch_ticket"]);
    let err = ddmin_shrink(&events, |_| false, 1.0, 10).unwrap_err();
    assert!(matches!(err, ShrinkError::PredicateDoesNotHold));
}

#[test]
fn shrink_respects_the_iteration_budget() {
    let events = trace((0 .. 20).map(|_| tool_called(0, "filler")).collect());
    // The full trace passes the predicate; every reduction is rejected, so
    // the loop can only exit through its iteration budget.
    let outcome = ddmin_shrink(
        &events,
        |candidate: &[tracegate_core::TraceEvent]| candidate.len() == events.len(),
        5.0,
        7,
    )
    .expect("shrink");
    assert!(outcome.stats.iterations <= 7);
    assert!(!outcome.stats.reduced());
}

#[test]
fn pipeline_shrink_preserves_failure_class_and_code() {
    let baseline = call_trace(&["fetch_ticket", "store_triage"]);
    let candidate = trace(vec![
        tool_called(0, "fetch_ticket"),
        tool_called(0, "log_event"),
        tool_called(0, "unsafe_export"),
        tool_called(0, "store_triage"),
    ]);
    let spec = spec_from(json!({
        "name": "test-spec",
        "command": "true",
        "contracts": {"tools": {"deny": ["unsafe_export"]}},
        "refinement": {"mode": "none"},
    }));

    let outcome = shrink_counterexample(
        &baseline,
        &candidate,
        &spec,
        FailureClass::Contract,
        codes::CONTRACT_TOOL_DENIED,
    )
    .expect("shrink");

    assert!(outcome.events.len() <= candidate.len());
    // The reduced trace still carries the denied call.
    assert!(outcome.events.iter().any(|event| {
        event.payload.get("tool_name").and_then(serde_json::Value::as_str)
            == Some("unsafe_export")
    }));
}

#[test]
fn pipeline_shrink_rejects_a_mismatched_target() {
    let baseline = call_trace(&["fetch_ticket"]);
    let candidate = call_trace(&["fetch_ticket"]);
    let spec = spec_from(json!({
        "name": "test-spec",
        "command": "true",
    }));
    let err = shrink_counterexample(
        &baseline,
        &candidate,
        &spec,
        FailureClass::Contract,
        codes::CONTRACT_TOOL_DENIED,
    )
    .unwrap_err();
    assert!(matches!(err, ShrinkError::PredicateDoesNotHold));
}
