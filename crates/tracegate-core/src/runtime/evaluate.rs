// crates/tracegate-core/src/runtime/evaluate.rs
// ============================================================================
// Module: Evaluation Pipeline
// Description: The sequential TRT decision procedure.
// Purpose: Compose normalization, abstraction, contracts, refinement, and
// witness resolution into one deterministic verdict function.
// Dependencies: serde_json, crate::core
// ============================================================================

//! ## Overview
//! `evaluate_trt` is the top-level verdict function. For fixed inputs the
//! output is identical across invocations: no randomness, no hash-map
//! iteration order dependence, no parallelism, no clock reads. Tooling
//! failures (invalid events, fixture exhaustion, injected runner failures)
//! are folded into the same violation union as contract and refinement
//! results so primary selection stays total.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;
use serde_json::json;

use crate::core::abstraction::AbstractTrace;
use crate::core::abstraction::AbstractionOptions;
use crate::core::contracts::evaluate_contracts;
use crate::core::events::EventKind;
use crate::core::events::EventType;
use crate::core::events::NormalizedEvent;
use crate::core::events::TraceEvent;
use crate::core::events::normalize_trace;
use crate::core::refinement::check_refinement;
use crate::core::report::ReportMetadata;
use crate::core::report::TrtReport;
use crate::core::report::TrtStatus;
use crate::core::shrink::ShrinkError;
use crate::core::shrink::ShrinkOutcome;
use crate::core::shrink::ddmin_shrink;
use crate::core::spec::ReplayMode;
use crate::core::spec::ResolvedSpec;
use crate::core::spec::SpecError;
use crate::core::violation::FailureClass;
use crate::core::violation::Violation;
use crate::core::violation::codes;
use crate::core::witness::WitnessResolution;
use crate::core::witness::resolve_witness;

// ============================================================================
// SECTION: Request and Result
// ============================================================================

/// Inputs for one spec evaluation.
///
/// # Invariants
/// - `tooling_violations` carries runner-observed failures (timeouts, guard
///   blocks) that must participate in witness resolution.
#[derive(Debug, Clone)]
pub struct EvaluationRequest<'a> {
    /// Recorded baseline trace.
    pub baseline_events: &'a [TraceEvent],
    /// Candidate trace from the replayed run.
    pub candidate_events: &'a [TraceEvent],
    /// Resolved spec in effect.
    pub spec: &'a ResolvedSpec,
    /// Command reproducing this evaluation offline.
    pub repro_command: String,
    /// Persisted counterexample artifact paths, keyed by artifact role.
    pub counterexample_paths: BTreeMap<String, String>,
    /// Warnings collected during spec resolution.
    pub warnings: Vec<String>,
    /// Tooling violations injected by the orchestrator.
    pub tooling_violations: Vec<Violation>,
}

impl<'a> EvaluationRequest<'a> {
    /// Creates a request with empty ancillary fields.
    #[must_use]
    pub fn new(
        baseline_events: &'a [TraceEvent],
        candidate_events: &'a [TraceEvent],
        spec: &'a ResolvedSpec,
        repro_command: impl Into<String>,
    ) -> Self {
        Self {
            baseline_events,
            candidate_events,
            spec,
            repro_command: repro_command.into(),
            counterexample_paths: BTreeMap::new(),
            warnings: Vec::new(),
            tooling_violations: Vec::new(),
        }
    }
}

/// Evaluation output: the verdict report plus intermediate artifacts.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Verdict status.
    pub status: TrtStatus,
    /// Verdict report.
    pub report: TrtReport,
    /// Witness resolution for FAIL verdicts.
    pub witness: Option<WitnessResolution>,
    /// Contract violations in emission order.
    pub contract_violations: Vec<Violation>,
    /// Refinement violations in emission order.
    pub refinement_violations: Vec<Violation>,
    /// Tooling violations in emission order.
    pub tooling_violations: Vec<Violation>,
    /// Abstraction of the baseline trace.
    pub baseline_abstract: Option<AbstractTrace>,
    /// Abstraction of the candidate trace.
    pub candidate_abstract: Option<AbstractTrace>,
}

// ============================================================================
// SECTION: Evaluation
// ============================================================================

/// Runs the full decision procedure for one spec.
///
/// # Errors
///
/// Returns [`SpecError`] only for defensive re-validation failures of the
/// resolved spec; trace-shape problems become TOOLING violations inside the
/// returned verdict.
pub fn evaluate_trt(request: &EvaluationRequest<'_>) -> Result<Evaluation, SpecError> {
    let spec = request.spec;
    let normalizer = spec.normalizer()?;
    let mut metadata = ReportMetadata {
        warnings: request.warnings.clone(),
        ..ReportMetadata::default()
    };
    if spec.replay.mode == ReplayMode::Offline && !spec.contracts.network.allow_domains.is_empty()
    {
        metadata.extra.insert(
            "network_allow_domains".to_string(),
            json!(spec.contracts.network.allow_domains.iter().collect::<Vec<&String>>()),
        );
    }

    let mut tooling = request.tooling_violations.clone();

    let baseline = match normalize_trace(request.baseline_events, &normalizer) {
        Ok(events) => Some(events),
        Err(error) => {
            tooling.push(trace_violation(&error.to_string(), error.violation_code(), 1));
            None
        }
    };
    let candidate = match normalize_trace(request.candidate_events, &normalizer) {
        Ok(events) => Some(events),
        Err(error) => {
            tooling.push(trace_violation(
                &error.to_string(),
                error.violation_code(),
                error.event_index().max(1),
            ));
            None
        }
    };

    let mut contract_violations = Vec::new();
    let mut refinement_violations = Vec::new();
    let mut baseline_abstract = None;
    let mut candidate_abstract = None;

    if let (Some(baseline_events), Some(candidate_events)) = (&baseline, &candidate) {
        tooling.extend(fixture_exhaustion_violations(candidate_events));

        let options = AbstractionOptions {
            ignore_call_tools: spec.refinement.ignore_call_tools.clone(),
        };
        let baseline_abs = crate::core::abstraction::abstract_trace(baseline_events, &options);
        let candidate_abs = crate::core::abstraction::abstract_trace(candidate_events, &options);

        contract_violations = evaluate_contracts(candidate_events, spec)?;

        let run_finished_index = candidate_events
            .iter()
            .rev()
            .find(|event| event.event_type == EventType::RunFinished)
            .or_else(|| candidate_events.last())
            .map_or(1, |event| event.seq);
        let refinement = check_refinement(
            &baseline_abs.skeleton,
            &candidate_abs.skeleton,
            &spec.refinement,
            &spec.side_effect_tools,
            run_finished_index,
        );
        metadata.refinement_skeleton_vacuous = refinement.vacuous;
        refinement_violations = refinement.violations;
        baseline_abstract = Some(baseline_abs);
        candidate_abstract = Some(candidate_abs);
    }

    let mut all: Vec<Violation> = Vec::with_capacity(
        refinement_violations.len() + contract_violations.len() + tooling.len(),
    );
    all.extend(refinement_violations.iter().cloned());
    all.extend(contract_violations.iter().cloned());
    all.extend(tooling.iter().cloned());

    let witness = resolve_witness(&all);
    let status = if all.is_empty() { TrtStatus::Pass } else { TrtStatus::Fail };
    debug_assert_eq!(status == TrtStatus::Pass, all.is_empty());
    if let Some(resolution) = &witness {
        debug_assert_eq!(
            Some(resolution.witness_index),
            all.iter().map(|violation| violation.event_index).min()
        );
    }

    let mut report = match &witness {
        Some(resolution) => TrtReport::fail(
            spec.name.clone(),
            request.repro_command.clone(),
            metadata,
            resolution,
            all,
        ),
        None => TrtReport::pass(spec.name.clone(), request.repro_command.clone(), metadata),
    };
    report.counterexample_paths = request.counterexample_paths.clone();

    Ok(Evaluation {
        status,
        report,
        witness,
        contract_violations,
        refinement_violations,
        tooling_violations: tooling,
        baseline_abstract,
        candidate_abstract,
    })
}

/// Wraps a trace error as a TOOLING violation.
fn trace_violation(message: &str, code: &'static str, event_index: u64) -> Violation {
    Violation::new(code, FailureClass::Tooling, event_index, message.to_string())
}

/// Surfaces fixture-exhaustion errors embedded in replayed result events.
///
/// The violation anchors at the request event that exhausted the bundle: the
/// nearest preceding call of the matching kind.
fn fixture_exhaustion_violations(events: &[NormalizedEvent]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (position, event) in events.iter().enumerate() {
        if !matches!(event.event_type, EventType::ToolReturned | EventType::LlmReturned) {
            continue;
        }
        let error_code = event.payload.get("error_code").and_then(Value::as_str);
        if error_code != Some(codes::FIXTURE_EXHAUSTED) {
            continue;
        }
        let request_kind = if event.event_type == EventType::ToolReturned {
            EventKind::ToolCall
        } else {
            EventKind::LlmRequest
        };
        let anchor = events[.. position]
            .iter()
            .rev()
            .find(|candidate| candidate.kind == request_kind)
            .map_or(event.seq, |candidate| candidate.seq);
        let message = event
            .payload
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("replay fixture exhausted")
            .to_string();
        violations.push(
            Violation::new(codes::FIXTURE_EXHAUSTED, FailureClass::Tooling, anchor, message)
                .with_observed(
                    event.payload.get("error_details").cloned().unwrap_or(Value::Null),
                )
                .with_hint("Re-record fixtures or adjust the replay matching policy."),
        );
    }
    violations
}

// ============================================================================
// SECTION: Counterexample Helpers
// ============================================================================

/// Returns the candidate prefix up to and including the witness event.
#[must_use]
pub fn counterexample_prefix(events: &[TraceEvent], witness_index: u64) -> Vec<TraceEvent> {
    events.iter().filter(|event| event.seq <= witness_index).cloned().collect()
}

/// Shrinks a failing candidate while preserving its failure identity.
///
/// The reduced trace is re-evaluated through the full pipeline before
/// acceptance; the original trace is returned when no reduction holds.
///
/// # Errors
///
/// Returns [`ShrinkError`] when bounds are invalid or the candidate does not
/// fail with the expected primary.
pub fn shrink_counterexample(
    baseline_events: &[TraceEvent],
    candidate_events: &[TraceEvent],
    spec: &ResolvedSpec,
    target_class: FailureClass,
    target_code: &str,
) -> Result<ShrinkOutcome, ShrinkError> {
    let predicate = |reduced: &[TraceEvent]| -> bool {
        let request = EvaluationRequest::new(baseline_events, reduced, spec, "");
        let Ok(evaluation) = evaluate_trt(&request) else {
            return false;
        };
        evaluation.witness.as_ref().is_some_and(|witness| {
            witness.primary.failure_class == target_class && witness.primary.code == target_code
        })
    };
    ddmin_shrink(candidate_events, predicate, spec.shrink.max_seconds, spec.shrink.max_iterations)
}
