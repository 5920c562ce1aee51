// crates/tracegate-cli/src/engine.rs
// ============================================================================
// Module: Orchestrator Engine
// Description: Record and run workflows driving the evaluation pipeline.
// Purpose: Own subprocess execution, store wiring, and artifact persistence.
// Dependencies: serde_json, thiserror, tracegate-core, tracegate-replay, tracegate-store-fs
// ============================================================================

//! ## Overview
//! The engine implements the two orchestrator workflows. Recording executes
//! the agent command with the fixture store in write mode and persists the
//! baseline atomically. Running resolves the baseline (failing fast on a
//! missing baseline or a normalizer version mismatch), replays the command
//! under the offline guard, drives the evaluation pipeline, and persists the
//! verdict with its counterexample artifacts. Exit codes follow the verdict:
//! 0 for PASS, 1 for a regression, 2 for tooling and configuration failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracegate_core::FailureClass;
use tracegate_core::ReplayMode;
use tracegate_core::ReportMetadata;
use tracegate_core::ResolvedSpec;
use tracegate_core::SpecError;
use tracegate_core::SpecName;
use tracegate_core::TraceEvent;
use tracegate_core::TrtReport;
use tracegate_core::TrtStatus;
use tracegate_core::Violation;
use tracegate_core::codes;
use tracegate_core::core::events::render_jsonl;
use tracegate_core::interfaces::ArtifactStore;
use tracegate_core::interfaces::BaselineRecord;
use tracegate_core::interfaces::BaselineStore;
use tracegate_core::interfaces::StoreError;
use tracegate_core::runtime::EvaluationRequest;
use tracegate_core::runtime::counterexample_prefix;
use tracegate_core::runtime::evaluate_trt;
use tracegate_core::runtime::shrink_counterexample;
use tracegate_replay::ExecutionResult;
use tracegate_replay::FixtureBundle;
use tracegate_replay::FixtureError;
use tracegate_replay::ReplayGuard;
use tracegate_replay::RunMode;
use tracegate_replay::RunnerConfig;
use tracegate_replay::RunnerError;
use tracegate_replay::execute_spec;
use tracegate_store_fs::FsArtifactStore;
use tracegate_store_fs::FsBaselineStore;
use tracegate_store_fs::FsStoreConfig;

use crate::render::render_markdown;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment flag marking a CI execution context.
pub const ENV_CI: &str = "TRACEGATE_CI";

/// Exit code for a passing evaluation.
pub const EXIT_SUCCESS: u8 = 0;

/// Exit code for a detected regression.
pub const EXIT_REGRESSION: u8 = 1;

/// Exit code for tooling, config, and spec errors.
pub const EXIT_TOOLING: u8 = 2;

/// Guard message fragment surfaced by conforming SDK shims on stderr.
const NETWORK_BLOCK_MARKER: &str = "replay mode blocks network access";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Orchestrator errors surfaced as exit code 2.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Spec file could not be read.
    #[error("cannot read spec file: {0}")]
    SpecIo(String),
    /// Spec resolution failed.
    #[error(transparent)]
    Spec(#[from] SpecError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Agent execution failed.
    #[error(transparent)]
    Runner(#[from] RunnerError),
    /// Fixture bundle handling failed.
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    /// Unexpected internal failure.
    #[error("internal error [{correlation_id}]: {message}")]
    Internal {
        /// Deterministic correlation identifier.
        correlation_id: String,
        /// Failure description.
        message: String,
    },
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Outcome of one CLI command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Process exit code.
    pub exit_code: u8,
    /// User-facing status lines.
    pub messages: Vec<String>,
}

impl CommandOutcome {
    fn new(exit_code: u8) -> Self {
        Self {
            exit_code,
            messages: Vec::new(),
        }
    }

    fn say(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }
}

// ============================================================================
// SECTION: Spec Loading
// ============================================================================

/// Loads and resolves a spec file.
///
/// # Errors
///
/// Returns [`EngineError`] when the file is unreadable or resolution fails.
pub fn load_spec(spec_path: &Path) -> Result<(ResolvedSpec, Vec<String>), EngineError> {
    let text =
        std::fs::read_to_string(spec_path).map_err(|error| EngineError::SpecIo(error.to_string()))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|error| EngineError::Spec(SpecError::Invalid(error.to_string())))?;
    Ok(ResolvedSpec::from_value(&value)?)
}

/// Builds the repro command recorded in verdicts.
fn repro_command(spec_path: &Path) -> String {
    format!("tracegate run --spec {}", spec_path.display())
}

// ============================================================================
// SECTION: Init and List
// ============================================================================

/// Initializes the state directory layout under the project root.
///
/// # Errors
///
/// Returns [`EngineError`] when the layout cannot be created.
pub fn init_workspace(project_root: &Path) -> Result<CommandOutcome, EngineError> {
    let config = FsStoreConfig::for_project(project_root);
    let store = FsBaselineStore::open(&config)?;
    Ok(CommandOutcome::new(EXIT_SUCCESS)
        .say(format!("initialized state directory at {}", store.root().display())))
}

/// Lists spec names with a recorded baseline.
///
/// # Errors
///
/// Returns [`EngineError`] when listing fails.
pub fn list_baselines(project_root: &Path) -> Result<CommandOutcome, EngineError> {
    let config = FsStoreConfig::for_project(project_root);
    let store = FsBaselineStore::open(&config)?;
    let names = store.list()?;
    let mut outcome = CommandOutcome::new(EXIT_SUCCESS);
    if names.is_empty() {
        outcome = outcome.say("no baselines recorded");
    }
    for name in names {
        outcome = outcome.say(name.to_string());
    }
    Ok(outcome)
}

// ============================================================================
// SECTION: Record
// ============================================================================

/// Records a baseline for the spec.
///
/// # Errors
///
/// Returns [`EngineError`] when the spec cannot be loaded or execution fails.
pub fn record_spec(
    project_root: &Path,
    spec_path: &Path,
    allow_ci_write: bool,
) -> Result<CommandOutcome, EngineError> {
    let ci_value = std::env::var(ENV_CI).ok();
    if ci_blocks_write(ci_value.as_deref(), allow_ci_write) {
        return Ok(CommandOutcome::new(EXIT_TOOLING).say(format!(
            "{}: refusing to write a baseline in CI without --allow-ci-write",
            codes::CI_BASELINE_WRITE_DENIED
        )));
    }

    let (spec, warnings) = load_spec(spec_path)?;
    let normalizer = spec.normalizer()?;
    let config = FsStoreConfig::for_project(project_root);
    let baseline_store = FsBaselineStore::open(&config)?;
    let runner_config = runner_paths(baseline_store.root(), &spec.name);

    let result =
        execute_spec(&spec, RunMode::Record, &runner_config, None, &normalizer)?;
    if result.timed_out {
        return Ok(CommandOutcome::new(EXIT_TOOLING).say(format!(
            "{}: agent command exceeded {}s during record",
            codes::RUN_TIMEOUT,
            spec.timeout_seconds
        )));
    }

    if result.exit_code != Some(0) {
        return Ok(CommandOutcome::new(EXIT_TOOLING).say(format!(
            "agent command exited with {:?} during record; baseline not written",
            result.exit_code
        )));
    }

    let bundle = FixtureBundle::from_events(&result.events, &normalizer)?;
    let record = BaselineRecord {
        events: result.events,
        fixtures: bundle.to_value()?,
        normalizer_version: normalizer.version().to_string(),
    };
    baseline_store.write(&spec.name, &record)?;

    let mut outcome = CommandOutcome::new(EXIT_SUCCESS)
        .say(format!("recorded baseline for {} ({} events)", spec.name, record.events.len()));
    for warning in warnings {
        outcome = outcome.say(format!("warning: {warning}"));
    }
    Ok(outcome)
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// Replays the spec against its baseline and evaluates the verdict.
///
/// # Errors
///
/// Returns [`EngineError`] when configuration or persistence fails; policy
/// and tooling failures are reported through the verdict instead.
pub fn run_spec(
    project_root: &Path,
    spec_path: &Path,
    shrink: bool,
) -> Result<CommandOutcome, EngineError> {
    let (spec, warnings) = load_spec(spec_path)?;
    let normalizer = spec.normalizer()?;
    let config = FsStoreConfig::for_project(project_root);
    let baseline_store = FsBaselineStore::open(&config)?;
    let artifact_store = FsArtifactStore::open(&config)?;
    let repro = repro_command(spec_path);

    let Some(baseline) = baseline_store.resolve(&spec.name)? else {
        let report = tooling_report(
            &spec,
            &repro,
            codes::BASELINE_MISSING,
            format!("no baseline recorded for {}", spec.name),
        );
        persist_report(&artifact_store, &spec.name, &report)?;
        return Ok(CommandOutcome::new(EXIT_TOOLING)
            .say(format!("{}: record a baseline first", codes::BASELINE_MISSING)));
    };

    let bundle = FixtureBundle::from_value(&baseline.fixtures)?;
    if let Err(error) = bundle.check_version() {
        let report = tooling_report(
            &spec,
            &repro,
            codes::NORMALIZER_VERSION_MISMATCH,
            error.to_string(),
        );
        persist_report(&artifact_store, &spec.name, &report)?;
        return Ok(CommandOutcome::new(EXIT_TOOLING).say(format!(
            "{}: re-record the baseline with the current engine",
            codes::NORMALIZER_VERSION_MISMATCH
        )));
    }

    let guard = ReplayGuard::for_spec(&spec);
    let runner_config = runner_paths(baseline_store.root(), &spec.name);
    let result =
        execute_spec(&spec, RunMode::Replay, &runner_config, Some(&guard), &normalizer)?;

    let tooling_violations = runner_violations(&spec, &result);
    let mut request =
        EvaluationRequest::new(&baseline.events, &result.events, &spec, repro.clone());
    request.warnings = warnings;
    request.tooling_violations = tooling_violations;
    let mut evaluation = evaluate_trt(&request)?;

    if evaluation.status == TrtStatus::Fail
        && let Some(witness) = &evaluation.witness
    {
        let prefix = counterexample_prefix(&result.events, witness.witness_index);
        let prefix_key = format!("repros/{}.counterexample.prefix.jsonl", spec.name);
        let prefix_text = render_jsonl(&prefix).map_err(|error| EngineError::Internal {
            correlation_id: correlation_id(&spec.name),
            message: error.to_string(),
        })?;
        artifact_store.put_bytes(&prefix_key, prefix_text.as_bytes())?;
        evaluation.report.counterexample_paths.insert("prefix".to_string(), prefix_key);

        if shrink {
            let target_class = witness.primary.failure_class;
            let target_code = witness.primary.code.clone();
            if let Ok(outcome) = shrink_counterexample(
                &baseline.events,
                &result.events,
                &spec,
                target_class,
                &target_code,
            ) {
                if outcome.stats.reduced() {
                    let min_key = format!("repros/{}.counterexample.min.jsonl", spec.name);
                    let min_text =
                        render_jsonl(&outcome.events).map_err(|error| EngineError::Internal {
                            correlation_id: correlation_id(&spec.name),
                            message: error.to_string(),
                        })?;
                    artifact_store.put_bytes(&min_key, min_text.as_bytes())?;
                    evaluation
                        .report
                        .counterexample_paths
                        .insert("minimized".to_string(), min_key);
                }
                evaluation.report.shrink_stats = Some(outcome.stats);
            }
        }
    }

    persist_report(&artifact_store, &spec.name, &evaluation.report)?;
    persist_candidate(&artifact_store, &spec.name, &result.events)?;

    let exit_code = exit_code_for(&evaluation.report);
    let mut outcome = CommandOutcome::new(exit_code).say(format!(
        "{}: {}",
        spec.name,
        evaluation.report.trt_status.as_str()
    ));
    if let Some(primary) = &evaluation.report.primary_violation {
        outcome = outcome.say(format!(
            "witness at seq {}: {} ({})",
            primary.event_index, primary.code, primary.message
        ));
    }
    Ok(outcome)
}

/// Reports whether the CI guard refuses a baseline write.
#[must_use]
pub fn ci_blocks_write(ci_value: Option<&str>, allow_ci_write: bool) -> bool {
    ci_value == Some("1") && !allow_ci_write
}

/// Maps a verdict to the orchestrator exit code.
#[must_use]
pub fn exit_code_for(report: &TrtReport) -> u8 {
    match report.trt_status {
        TrtStatus::Pass => EXIT_SUCCESS,
        TrtStatus::Fail => {
            if report.failure_class == Some(FailureClass::Tooling) {
                EXIT_TOOLING
            } else {
                EXIT_REGRESSION
            }
        }
    }
}

// ============================================================================
// SECTION: Runner Violations
// ============================================================================

/// Derives tooling violations from the execution result.
fn runner_violations(spec: &ResolvedSpec, result: &ExecutionResult) -> Vec<Violation> {
    let mut violations = Vec::new();
    let last_seq = result.events.last().map_or(1, |event| event.seq);

    if result.timed_out {
        violations.push(
            Violation::new(
                codes::RUN_TIMEOUT,
                FailureClass::Tooling,
                last_seq,
                format!("agent command exceeded {}s wall-clock timeout", spec.timeout_seconds),
            )
            .with_hint("Raise timeout_seconds or investigate the hung step."),
        );
    }
    if spec.replay.mode == ReplayMode::Offline
        && result.stderr_tail.contains(NETWORK_BLOCK_MARKER)
    {
        violations.push(
            Violation::new(
                codes::REPLAY_NETWORK_BLOCKED,
                FailureClass::Tooling,
                last_seq,
                "network egress was blocked during offline replay".to_string(),
            )
            .with_hint("Allowlist the domain or record fixtures for the call."),
        );
    }
    violations
}

// ============================================================================
// SECTION: Persistence Helpers
// ============================================================================

/// Returns runner paths under the state directory for a spec.
fn runner_paths(state_root: &Path, spec_name: &SpecName) -> RunnerConfig {
    RunnerConfig {
        events_path: state_root.join("current").join(format!("{spec_name}.jsonl")),
        fixtures_path: state_root.join("fixtures").join(format!("{spec_name}.json")),
    }
}

/// Builds a FAIL report carrying a single tooling violation.
fn tooling_report(
    spec: &ResolvedSpec,
    repro: &str,
    code: &'static str,
    message: String,
) -> TrtReport {
    let violation = Violation::new(code, FailureClass::Tooling, 1, message);
    let all = vec![violation];
    let witness = tracegate_core::core::witness::resolve_witness(&all);
    match witness {
        Some(resolution) => TrtReport::fail(
            spec.name.clone(),
            repro.to_string(),
            ReportMetadata::default(),
            &resolution,
            all,
        ),
        None => TrtReport::pass(spec.name.clone(), repro.to_string(), ReportMetadata::default()),
    }
}

/// Persists the per-spec report plus the latest aggregate artifacts.
fn persist_report(
    store: &FsArtifactStore,
    spec_name: &SpecName,
    report: &TrtReport,
) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(report).map_err(|error| EngineError::Internal {
        correlation_id: correlation_id(spec_name),
        message: error.to_string(),
    })?;
    let mut payload = json;
    payload.push('\n');
    store.put_bytes(&format!("reports/{spec_name}.json"), payload.as_bytes())?;
    store.put_bytes("reports/latest.json", payload.as_bytes())?;
    store.put_bytes("reports/latest.md", render_markdown(report).as_bytes())?;
    Ok(())
}

/// Persists the candidate trace under `current/`.
fn persist_candidate(
    store: &FsArtifactStore,
    spec_name: &SpecName,
    events: &[TraceEvent],
) -> Result<(), EngineError> {
    let text = render_jsonl(events).map_err(|error| EngineError::Internal {
        correlation_id: correlation_id(spec_name),
        message: error.to_string(),
    })?;
    store.put_bytes(&format!("current/{spec_name}.jsonl"), text.as_bytes())?;
    Ok(())
}

/// Derives a deterministic correlation id from the spec name.
fn correlation_id(spec_name: &SpecName) -> String {
    let digest = tracegate_core::hashing::hash_bytes(
        tracegate_core::hashing::DEFAULT_HASH_ALGORITHM,
        spec_name.as_str().as_bytes(),
    );
    digest.hex.chars().take(12).collect()
}

// ============================================================================
// SECTION: Report Display
// ============================================================================

/// Loads the latest aggregate report text.
///
/// # Errors
///
/// Returns [`EngineError`] when no report has been written yet.
pub fn show_report(project_root: &Path) -> Result<CommandOutcome, EngineError> {
    let config = FsStoreConfig::for_project(project_root);
    let store = FsArtifactStore::open(&config)?;
    let bytes = store.get_bytes("reports/latest.json")?;
    Ok(CommandOutcome::new(EXIT_SUCCESS).say(String::from_utf8_lossy(&bytes).into_owned()))
}
