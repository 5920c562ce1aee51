// crates/tracegate-core/tests/scenarios.rs
// ============================================================================
// Module: End-to-End Scenario Tests
// Description: Full-pipeline verdict scenarios over hand-built traces.
// ============================================================================
//! ## Overview
//! Drives the complete decision procedure through concrete scenarios:
//! denied tools with refinement interplay, ordered obligations, allowed and
//! disallowed extras, fixture exhaustion, and bit-identical reruns.

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
use tracegate_core::TraceEvent;
use tracegate_core::TrtStatus;
use tracegate_core::codes;
use tracegate_core::hashing::canonical_json_bytes;
use tracegate_core::runtime::EvaluationRequest;
use tracegate_core::runtime::counterexample_prefix;
use tracegate_core::runtime::evaluate_trt;

use common::call_trace;
use common::event;
use common::llm_called;
use common::spec_from;
use common::trace;

fn seq_of_call(events: &[TraceEvent], tool_name: &str) -> u64 {
    events
        .iter()
        .find(|event| {
            event.event_type == EventType::ToolCalled
                && event.payload.get("tool_name").and_then(serde_json::Value::as_str)
                    == Some(tool_name)
        })
        .map(|event| event.seq)
        .expect("tool call present")
}

#[test]
fn scenario_tool_deny_with_refinement_interplay() {
    // Baseline [fetch_ticket, store_triage]; candidate swaps the second call
    // for a denied, unknown tool.
    let baseline = call_trace(&["fetch_ticket", "store_triage"]);
    let candidate = call_trace(&["fetch_ticket", "unsafe_export"]);
    let spec = spec_from(json!({
        "name": "triage-agent",
        "command": "true",
        "contracts": {"tools": {
            "allow": ["fetch_ticket", "store_triage"],
            "deny": ["unsafe_export"],
        }},
        "refinement": {"mode": "skeleton", "allow_new_tool_names": false},
    }));

    let request = EvaluationRequest::new(&baseline, &candidate, &spec, "tracegate run");
    let evaluation = evaluate_trt(&request).expect("evaluate");

    assert_eq!(evaluation.status, TrtStatus::Fail);
    let witness = evaluation.witness.expect("witness");
    let unsafe_seq = seq_of_call(&candidate, "unsafe_export");
    assert_eq!(witness.witness_index, unsafe_seq);

    let codes_at_witness: Vec<&str> =
        witness.all_at_witness.iter().map(|violation| violation.code.as_str()).collect();
    assert!(codes_at_witness.contains(&codes::CONTRACT_TOOL_DENIED));
    assert!(codes_at_witness.contains(&codes::REFINEMENT_NEW_TOOL_NAME_FORBIDDEN));
    assert_eq!(witness.primary.code, codes::REFINEMENT_NEW_TOOL_NAME_FORBIDDEN);

    // The missing store_triage call anchors at run_finished, after the witness.
    let finished_seq = candidate.last().expect("run_finished").seq;
    let missing = evaluation
        .report
        .violations
        .iter()
        .find(|violation| violation.code == codes::REFINEMENT_BASELINE_CALL_MISSING)
        .expect("missing-call violation");
    assert_eq!(missing.event_index, finished_seq);
    assert!(missing.event_index > witness.witness_index);
}

#[test]
fn scenario_required_before_violated() {
    let baseline = call_trace(&["fetch_pr", "lint_code", "post_review"]);
    let candidate = call_trace(&["fetch_pr", "post_review"]);
    let spec = spec_from(json!({
        "name": "review-agent",
        "command": "true",
        "contracts": {"sequence": {"require_before": [
            {"before": "lint_code", "after": "post_review"}
        ]}},
    }));

    let request = EvaluationRequest::new(&baseline, &candidate, &spec, "tracegate run");
    let evaluation = evaluate_trt(&request).expect("evaluate");

    assert_eq!(evaluation.status, TrtStatus::Fail);
    let witness = evaluation.witness.expect("witness");
    assert_eq!(witness.witness_index, seq_of_call(&candidate, "post_review"));
    assert_eq!(witness.primary.code, codes::SEQUENCE_REQUIRE_BEFORE);
}

#[test]
fn scenario_extra_allowed_tool_passes() {
    let baseline = call_trace(&["fetch_ticket", "store_triage"]);
    let candidate = call_trace(&["fetch_ticket", "log_event", "store_triage"]);
    let spec = spec_from(json!({
        "name": "triage-agent",
        "command": "true",
        "refinement": {"mode": "skeleton", "allow_extra_tools": ["log_event"]},
    }));

    let request = EvaluationRequest::new(&baseline, &candidate, &spec, "tracegate run");
    let evaluation = evaluate_trt(&request).expect("evaluate");

    assert_eq!(evaluation.status, TrtStatus::Pass);
    assert!(evaluation.report.violations.is_empty());
    assert!(!evaluation.report.metadata.refinement_skeleton_vacuous);
}

#[test]
fn scenario_extra_disallowed_tool_fails_at_the_extra_call() {
    let baseline = call_trace(&["fetch_ticket", "store_triage"]);
    let candidate = call_trace(&["fetch_ticket", "log_event", "store_triage"]);
    let spec = spec_from(json!({
        "name": "triage-agent",
        "command": "true",
        "refinement": {
            "mode": "skeleton",
            "allow_extra_tools": [],
            "allow_new_tool_names": false,
        },
    }));

    let request = EvaluationRequest::new(&baseline, &candidate, &spec, "tracegate run");
    let evaluation = evaluate_trt(&request).expect("evaluate");

    assert_eq!(evaluation.status, TrtStatus::Fail);
    let witness = evaluation.witness.expect("witness");
    assert_eq!(witness.witness_index, seq_of_call(&candidate, "log_event"));
    assert_eq!(witness.primary.code, codes::REFINEMENT_EXTRA_TOOL_CALL);
    assert_eq!(witness.primary.failure_class, FailureClass::Refinement);
}

#[test]
fn scenario_fixture_exhaustion_is_a_tooling_failure() {
    // Two recorded LLM exchanges; the third request finds no fixture and the
    // replayed result event carries the exhaustion error.
    let baseline = trace(vec![
        llm_called(0, "plan"),
        common::llm_returned(0, "plan done", 10, 10),
        llm_called(0, "write"),
        common::llm_returned(0, "write done", 10, 10),
    ]);
    let candidate = trace(vec![
        llm_called(0, "plan"),
        common::llm_returned(0, "plan done", 10, 10),
        llm_called(0, "write"),
        common::llm_returned(0, "write done", 10, 10),
        llm_called(0, "surprise"),
        event(
            EventType::LlmReturned,
            0,
            json!({
                "provider": "openai",
                "model": "gpt-4o-mini",
                "error": "replay fixture exhausted",
                "error_code": "FIXTURE_EXHAUSTED",
                "error_details": {"expected_signature": "deadbeef", "available_count": 0},
            }),
        ),
    ]);
    let spec = spec_from(json!({
        "name": "writer-agent",
        "command": "true",
    }));

    let request = EvaluationRequest::new(&baseline, &candidate, &spec, "tracegate run");
    let evaluation = evaluate_trt(&request).expect("evaluate");

    assert_eq!(evaluation.status, TrtStatus::Fail);
    let witness = evaluation.witness.expect("witness");
    assert_eq!(witness.primary.code, codes::FIXTURE_EXHAUSTED);
    assert_eq!(witness.primary.failure_class, FailureClass::Tooling);
    // Anchored at the third llm_called event, not at its errored return.
    assert_eq!(witness.witness_index, 6);
}

#[test]
fn scenario_verdicts_are_bit_identical_across_reruns() {
    let baseline = call_trace(&["fetch_ticket", "store_triage"]);
    let candidate = call_trace(&["fetch_ticket", "unsafe_export"]);
    let spec = spec_from(json!({
        "name": "triage-agent",
        "command": "true",
        "contracts": {"tools": {
            "allow": ["fetch_ticket", "store_triage"],
            "deny": ["unsafe_export"],
        }},
        "refinement": {"mode": "skeleton", "allow_new_tool_names": false},
    }));

    let request = EvaluationRequest::new(&baseline, &candidate, &spec, "tracegate run");
    let first = evaluate_trt(&request).expect("first run");
    let second = evaluate_trt(&request).expect("second run");

    let first_bytes = canonical_json_bytes(&first.report).expect("serialize first");
    let second_bytes = canonical_json_bytes(&second.report).expect("serialize second");
    assert_eq!(first_bytes, second_bytes);

    let first_witness = first.witness.expect("first witness");
    let second_witness = second.witness.expect("second witness");
    let first_prefix = counterexample_prefix(&candidate, first_witness.witness_index);
    let second_prefix = counterexample_prefix(&candidate, second_witness.witness_index);
    let first_prefix_bytes = canonical_json_bytes(&first_prefix).expect("prefix first");
    let second_prefix_bytes = canonical_json_bytes(&second_prefix).expect("prefix second");
    assert_eq!(first_prefix_bytes, second_prefix_bytes);
}

#[test]
fn scenario_counterexample_prefix_ends_at_the_witness() {
    let baseline = call_trace(&["fetch_ticket"]);
    let candidate = call_trace(&["fetch_ticket", "unsafe_export"]);
    let spec = spec_from(json!({
        "name": "triage-agent",
        "command": "true",
        "contracts": {"tools": {"deny": ["unsafe_export"]}},
        "refinement": {"mode": "none"},
    }));

    let request = EvaluationRequest::new(&baseline, &candidate, &spec, "tracegate run");
    let evaluation = evaluate_trt(&request).expect("evaluate");
    let witness = evaluation.witness.expect("witness");

    let prefix = counterexample_prefix(&candidate, witness.witness_index);
    assert_eq!(prefix.last().map(|event| event.seq), Some(witness.witness_index));
    assert!(prefix.len() < candidate.len());
}

#[test]
fn scenario_identical_traces_pass() {
    let baseline = call_trace(&["fetch_ticket", "store_triage"]);
    let candidate = baseline.clone();
    let spec = spec_from(json!({
        "name": "triage-agent",
        "command": "true",
        "contracts": {"tools": {"allow": ["fetch_ticket", "store_triage"]}},
    }));

    let request = EvaluationRequest::new(&baseline, &candidate, &spec, "tracegate run");
    let evaluation = evaluate_trt(&request).expect("evaluate");
    assert_eq!(evaluation.status, TrtStatus::Pass);
    assert!(evaluation.report.witness_index.is_none());
    assert!(evaluation.report.primary_violation.is_none());
}
