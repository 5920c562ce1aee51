// crates/tracegate-core/src/core/refinement.rs
// ============================================================================
// Module: Refinement Checker
// Description: Policy-aware skeleton subsequence checking.
// Purpose: Decide whether the baseline skeleton embeds into the candidate.
// Dependencies: serde_json, crate::core::{abstraction, spec, violation}
// ============================================================================

//! ## Overview
//! The checker decides whether the baseline call skeleton is a policy-aware
//! subsequence of the candidate skeleton. The embedding is the leftmost
//! greedy one: each baseline element matches the earliest still-available
//! candidate position, which makes the set of "extra" positions canonical.
//! The scan is single-pass and index-ordered; violations append in traversal
//! order with no hash-iteration dependence.
//!
//! A failed greedy scan has, by construction, consumed the whole candidate
//! skeleton, so the missing-call violation anchors at `run_finished`. Extra
//! calls are only classified when the embedding succeeds; an undefined
//! embedding defines no extras.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde_json::Value;
use serde_json::json;

use crate::core::abstraction::SkeletonStep;
use crate::core::identifiers::ToolName;
use crate::core::spec::RefinementMode;
use crate::core::spec::RefinementOptions;
use crate::core::violation::FailureClass;
use crate::core::violation::Violation;
use crate::core::violation::codes;

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Refinement check outcome.
///
/// # Invariants
/// - `vacuous` is true only when the baseline skeleton is empty and the mode
///   is not `none`.
/// - `embedding`, when present, is a strictly increasing list of candidate
///   positions witnessing the subsequence relation.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOutcome {
    /// Violations in traversal order.
    pub violations: Vec<Violation>,
    /// Whether the check was vacuously satisfied.
    pub vacuous: bool,
    /// Witnessing embedding of baseline positions into candidate positions.
    pub embedding: Option<Vec<usize>>,
}

impl RefinementOutcome {
    fn passed(vacuous: bool, embedding: Option<Vec<usize>>) -> Self {
        Self {
            violations: Vec::new(),
            vacuous,
            embedding,
        }
    }
}

// ============================================================================
// SECTION: Greedy Embedding
// ============================================================================

/// Greedy leftmost subsequence scan in `O(|baseline| + |candidate|)`.
///
/// Returns the matched candidate positions and, when the scan fails, the
/// first baseline name that could not be placed.
fn greedy_embedding(
    baseline: &[SkeletonStep],
    candidate: &[SkeletonStep],
) -> (Vec<usize>, Option<ToolName>) {
    let mut matches = Vec::with_capacity(baseline.len());
    let mut baseline_idx = 0_usize;
    let mut candidate_idx = 0_usize;

    while baseline_idx < baseline.len() && candidate_idx < candidate.len() {
        if baseline[baseline_idx].tool_name == candidate[candidate_idx].tool_name {
            matches.push(candidate_idx);
            baseline_idx += 1;
        }
        candidate_idx += 1;
    }

    if baseline_idx == baseline.len() {
        (matches, None)
    } else {
        (matches, Some(baseline[baseline_idx].tool_name.clone()))
    }
}

// ============================================================================
// SECTION: Checker
// ============================================================================

/// Checks skeleton refinement under the configured policy.
///
/// `run_finished_index` anchors violations that are only observable at the
/// end of the run.
#[must_use]
pub fn check_refinement(
    baseline: &[SkeletonStep],
    candidate: &[SkeletonStep],
    options: &RefinementOptions,
    side_effect_tools: &BTreeSet<ToolName>,
    run_finished_index: u64,
) -> RefinementOutcome {
    if options.mode == RefinementMode::None {
        return RefinementOutcome::passed(false, None);
    }
    if baseline.is_empty() {
        // Empty baseline skeleton is vacuous; contracts remain the only
        // active obligations.
        return RefinementOutcome::passed(true, Some(Vec::new()));
    }

    let (matched_positions, first_missing) = greedy_embedding(baseline, candidate);
    let embedded = first_missing.is_none();
    let mut violations = Vec::new();

    if let Some(missing) = &first_missing {
        let observed: Vec<&str> =
            candidate.iter().map(|step| step.tool_name.as_str()).collect();
        violations.push(
            Violation::new(
                codes::REFINEMENT_BASELINE_CALL_MISSING,
                FailureClass::Refinement,
                run_finished_index,
                format!("baseline skeleton call missing in candidate run: {missing}"),
            )
            .with_expected(Value::String(missing.as_str().to_string()))
            .with_observed(json!(observed))
            .with_hint("Ensure the baseline tool protocol remains a subsequence."),
        );
    }

    let matched: BTreeSet<usize> = matched_positions.iter().copied().collect();
    let baseline_names: BTreeSet<&str> =
        baseline.iter().map(|step| step.tool_name.as_str()).collect();
    let mut reported_new_names: BTreeSet<&str> = BTreeSet::new();

    for (position, step) in candidate.iter().enumerate() {
        if matched.contains(&position) {
            continue;
        }
        let name = step.tool_name.as_str();
        let name_allowed = options.allow_extra_tools.contains(name)
            || (side_effect_tools.contains(name)
                && options.allow_extra_side_effect_tools.contains(name));

        let extra_rejected = match options.mode {
            RefinementMode::Strict => true,
            RefinementMode::Skeleton => embedded && !name_allowed,
            RefinementMode::None => false,
        };
        if extra_rejected {
            violations.push(
                Violation::new(
                    codes::REFINEMENT_EXTRA_TOOL_CALL,
                    FailureClass::Refinement,
                    step.event_index,
                    format!("extra tool call not allowed by refinement policy: {name}"),
                )
                .with_expected(json!(sorted_names(&options.allow_extra_tools)))
                .with_observed(Value::String(name.to_string()))
                .with_hint("Add the tool to refinement.allow_extra_tools or remove the call."),
            );
        }

        if side_effect_tools.contains(name)
            && !options.allow_extra_side_effect_tools.contains(name)
            && (embedded || options.mode == RefinementMode::Strict)
        {
            violations.push(
                Violation::new(
                    codes::REFINEMENT_EXTRA_SIDE_EFFECT_CALL,
                    FailureClass::Refinement,
                    step.event_index,
                    format!("extra side-effect tool call not allowed: {name}"),
                )
                .with_expected(json!(sorted_names(&options.allow_extra_side_effect_tools)))
                .with_observed(Value::String(name.to_string()))
                .with_hint("Allow explicitly via refinement.allow_extra_side_effect_tools."),
            );
        }

        if !options.allow_new_tool_names
            && !baseline_names.contains(name)
            && !options.allow_extra_tools.contains(name)
            && !options.allow_extra_side_effect_tools.contains(name)
            && reported_new_names.insert(name)
        {
            let mut permitted: Vec<&str> = baseline_names.iter().copied().collect();
            permitted.extend(options.allow_extra_tools.iter().map(ToolName::as_str));
            permitted.sort_unstable();
            permitted.dedup();
            violations.push(
                Violation::new(
                    codes::REFINEMENT_NEW_TOOL_NAME_FORBIDDEN,
                    FailureClass::Refinement,
                    step.event_index,
                    format!("new tool name not permitted by refinement policy: {name}"),
                )
                .with_expected(json!(permitted))
                .with_observed(Value::String(name.to_string()))
                .with_hint(
                    "Set refinement.allow_new_tool_names=true or update allow_extra_tools.",
                ),
            );
        }
    }

    if violations.is_empty() {
        return RefinementOutcome::passed(false, Some(matched_positions));
    }
    RefinementOutcome {
        violations,
        vacuous: false,
        embedding: embedded.then_some(matched_positions),
    }
}

/// Renders a sorted name list for violation payloads.
fn sorted_names(names: &BTreeSet<ToolName>) -> Vec<&str> {
    names.iter().map(ToolName::as_str).collect()
}
