// crates/tracegate-core/tests/refinement.rs
// ============================================================================
// Module: Refinement Checker Tests
// Description: Skeleton subsequence checking under refinement policy.
// ============================================================================
//! ## Overview
//! Covers the greedy embedding, extra-call allowances, new-name policy,
//! vacuity, and strict mode, including the violation anchoring rules.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeSet;

use tracegate_core::RefinementMode;
use tracegate_core::RefinementOptions;
use tracegate_core::ToolName;
use tracegate_core::codes;
use tracegate_core::core::abstraction::SkeletonStep;
use tracegate_core::core::refinement::check_refinement;

const RUN_FINISHED: u64 = 99;

fn skeleton(names: &[(&str, u64)]) -> Vec<SkeletonStep> {
    names
        .iter()
        .map(|(name, seq)| SkeletonStep {
            event_index: *seq,
            tool_name: ToolName::new(*name),
        })
        .collect()
}

fn tool_set(names: &[&str]) -> BTreeSet<ToolName> {
    names.iter().map(|name| ToolName::new(*name)).collect()
}

fn options() -> RefinementOptions {
    RefinementOptions::default()
}

#[test]
fn identical_skeletons_refine() {
    let baseline = skeleton(&[("fetch_ticket", 2), ("store_triage", 4)]);
    let candidate = skeleton(&[("fetch_ticket", 2), ("store_triage", 4)]);
    let outcome =
        check_refinement(&baseline, &candidate, &options(), &BTreeSet::new(), RUN_FINISHED);
    assert!(outcome.violations.is_empty());
    assert!(!outcome.vacuous);
    assert_eq!(outcome.embedding, Some(vec![0, 1]));
}

#[test]
fn empty_baseline_is_vacuous() {
    let candidate = skeleton(&[("fetch_ticket", 2)]);
    let outcome = check_refinement(&[], &candidate, &options(), &BTreeSet::new(), RUN_FINISHED);
    assert!(outcome.violations.is_empty());
    assert!(outcome.vacuous);
}

#[test]
fn mode_none_disables_checking() {
    let baseline = skeleton(&[("fetch_ticket", 2)]);
    let candidate = skeleton(&[("unrelated", 2)]);
    let disabled = RefinementOptions {
        mode: RefinementMode::None,
        ..options()
    };
    let outcome =
        check_refinement(&baseline, &candidate, &disabled, &BTreeSet::new(), RUN_FINISHED);
    assert!(outcome.violations.is_empty());
    assert!(!outcome.vacuous);
}

#[test]
fn extra_allowed_tool_passes() {
    // Baseline [fetch_ticket, store_triage]; candidate adds an allowed
    // log_event in between.
    let baseline = skeleton(&[("fetch_ticket", 2), ("store_triage", 6)]);
    let candidate = skeleton(&[("fetch_ticket", 2), ("log_event", 4), ("store_triage", 6)]);
    let allowing = RefinementOptions {
        allow_extra_tools: tool_set(&["log_event"]),
        ..options()
    };
    let outcome =
        check_refinement(&baseline, &candidate, &allowing, &BTreeSet::new(), RUN_FINISHED);
    assert!(outcome.violations.is_empty(), "violations: {:?}", outcome.violations);
}

#[test]
fn extra_disallowed_tool_fails_at_the_extra_call() {
    let baseline = skeleton(&[("fetch_ticket", 2), ("store_triage", 6)]);
    let candidate = skeleton(&[("fetch_ticket", 2), ("log_event", 4), ("store_triage", 6)]);
    let outcome =
        check_refinement(&baseline, &candidate, &options(), &BTreeSet::new(), RUN_FINISHED);

    let extra = outcome
        .violations
        .iter()
        .find(|violation| violation.code == codes::REFINEMENT_EXTRA_TOOL_CALL)
        .expect("extra tool call violation");
    assert_eq!(extra.event_index, 4);

    // log_event is also a new name under the default policy.
    assert!(
        outcome
            .violations
            .iter()
            .any(|violation| violation.code == codes::REFINEMENT_NEW_TOOL_NAME_FORBIDDEN)
    );
}

#[test]
fn missing_baseline_call_anchors_at_run_finished() {
    let baseline = skeleton(&[("fetch_ticket", 2), ("store_triage", 4)]);
    let candidate = skeleton(&[("fetch_ticket", 2)]);
    let outcome =
        check_refinement(&baseline, &candidate, &options(), &BTreeSet::new(), RUN_FINISHED);

    assert_eq!(outcome.violations.len(), 1);
    let missing = &outcome.violations[0];
    assert_eq!(missing.code, codes::REFINEMENT_BASELINE_CALL_MISSING);
    assert_eq!(missing.event_index, RUN_FINISHED);
    assert!(outcome.embedding.is_none());
}

#[test]
fn failed_embedding_does_not_classify_extras() {
    // store_triage is missing and unsafe_export is unmatched; the unmatched
    // call is reported as a forbidden new name, not as an extra call.
    let baseline = skeleton(&[("fetch_ticket", 2), ("store_triage", 4)]);
    let candidate = skeleton(&[("fetch_ticket", 2), ("unsafe_export", 4)]);
    let outcome =
        check_refinement(&baseline, &candidate, &options(), &BTreeSet::new(), RUN_FINISHED);

    let codes_seen: Vec<&str> =
        outcome.violations.iter().map(|violation| violation.code.as_str()).collect();
    assert!(codes_seen.contains(&codes::REFINEMENT_BASELINE_CALL_MISSING));
    assert!(codes_seen.contains(&codes::REFINEMENT_NEW_TOOL_NAME_FORBIDDEN));
    assert!(!codes_seen.contains(&codes::REFINEMENT_EXTRA_TOOL_CALL));
}

#[test]
fn new_name_reported_once_at_first_occurrence() {
    let baseline = skeleton(&[("fetch_ticket", 2)]);
    let candidate =
        skeleton(&[("fetch_ticket", 2), ("log_event", 4), ("log_event", 6)]);
    let allowing_extras = RefinementOptions {
        allow_extra_tools: BTreeSet::new(),
        ..options()
    };
    let outcome = check_refinement(
        &baseline,
        &candidate,
        &allowing_extras,
        &BTreeSet::new(),
        RUN_FINISHED,
    );
    let new_name: Vec<&tracegate_core::Violation> = outcome
        .violations
        .iter()
        .filter(|violation| violation.code == codes::REFINEMENT_NEW_TOOL_NAME_FORBIDDEN)
        .collect();
    assert_eq!(new_name.len(), 1);
    assert_eq!(new_name[0].event_index, 4);
}

#[test]
fn side_effect_extra_requires_explicit_allowance() {
    let baseline = skeleton(&[("fetch_ticket", 2)]);
    let candidate = skeleton(&[("fetch_ticket", 2), ("send_email", 4)]);
    let side_effects = tool_set(&["send_email"]);

    let allowing = RefinementOptions {
        allow_extra_tools: tool_set(&["send_email"]),
        ..options()
    };
    let outcome =
        check_refinement(&baseline, &candidate, &allowing, &side_effects, RUN_FINISHED);
    assert!(
        outcome
            .violations
            .iter()
            .any(|violation| violation.code == codes::REFINEMENT_EXTRA_SIDE_EFFECT_CALL)
    );

    let allowing_both = RefinementOptions {
        allow_extra_tools: tool_set(&["send_email"]),
        allow_extra_side_effect_tools: tool_set(&["send_email"]),
        ..options()
    };
    let outcome =
        check_refinement(&baseline, &candidate, &allowing_both, &side_effects, RUN_FINISHED);
    assert!(outcome.violations.is_empty(), "violations: {:?}", outcome.violations);
}

#[test]
fn allow_new_tool_names_suppresses_the_name_check() {
    let baseline = skeleton(&[("fetch_ticket", 2)]);
    let candidate = skeleton(&[("fetch_ticket", 2), ("log_event", 4)]);
    let permissive = RefinementOptions {
        allow_new_tool_names: true,
        allow_extra_tools: tool_set(&["log_event"]),
        ..options()
    };
    let outcome =
        check_refinement(&baseline, &candidate, &permissive, &BTreeSet::new(), RUN_FINISHED);
    assert!(outcome.violations.is_empty(), "violations: {:?}", outcome.violations);
}

#[test]
fn strict_mode_rejects_name_allowed_extras() {
    let baseline = skeleton(&[("fetch_ticket", 2), ("store_triage", 6)]);
    let candidate = skeleton(&[("fetch_ticket", 2), ("log_event", 4), ("store_triage", 6)]);
    let strict = RefinementOptions {
        mode: RefinementMode::Strict,
        allow_extra_tools: tool_set(&["log_event"]),
        allow_new_tool_names: true,
        ..options()
    };
    let outcome =
        check_refinement(&baseline, &candidate, &strict, &BTreeSet::new(), RUN_FINISHED);
    let extra = outcome
        .violations
        .iter()
        .find(|violation| violation.code == codes::REFINEMENT_EXTRA_TOOL_CALL)
        .expect("strict mode extra violation");
    assert_eq!(extra.event_index, 4);
}

#[test]
fn greedy_embedding_is_leftmost() {
    // Two fetch_ticket candidates; the embedding must take the earliest.
    let baseline = skeleton(&[("fetch_ticket", 2)]);
    let candidate = skeleton(&[("fetch_ticket", 2), ("fetch_ticket", 4)]);
    let allowing = RefinementOptions {
        allow_extra_tools: tool_set(&["fetch_ticket"]),
        ..options()
    };
    let outcome =
        check_refinement(&baseline, &candidate, &allowing, &BTreeSet::new(), RUN_FINISHED);
    assert_eq!(outcome.embedding, Some(vec![0]));
    assert!(outcome.violations.is_empty());
}
