// crates/tracegate-core/src/core/report.rs
// ============================================================================
// Module: Report Schema
// Description: Verdict and report payloads with stable serialization.
// Purpose: Define the external verdict contract produced by the pipeline.
// Dependencies: serde, serde_json, crate::core::{canonical, identifiers, spec, violation, witness}
// ============================================================================

//! ## Overview
//! The report is the single user-facing output of one spec evaluation. Its
//! serialization is deterministic: sorted maps, no clocks, no stack traces.
//! Repeated evaluations of identical inputs serialize to byte-identical
//! report documents.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::canonical::NORMALIZER_VERSION;
use crate::core::identifiers::SpecName;
use crate::core::spec::SIDE_EFFECT_REGISTRY_VERSION;
use crate::core::violation::FailureClass;
use crate::core::violation::Violation;
use crate::core::witness::WitnessResolution;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Report schema version.
pub const REPORT_SCHEMA_VERSION: &str = "0.4";

// ============================================================================
// SECTION: Status
// ============================================================================

/// Verdict status.
///
/// # Invariants
/// - Variants serialize as `PASS` / `FAIL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrtStatus {
    /// No violations were observed.
    Pass,
    /// At least one violation was observed.
    Fail,
}

impl TrtStatus {
    /// Returns the stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

// ============================================================================
// SECTION: Shrink Stats
// ============================================================================

/// Shrinker outcome statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShrinkStats {
    /// Event count before shrinking.
    pub original_len: usize,
    /// Event count after shrinking.
    pub reduced_len: usize,
    /// Reduction attempts performed.
    pub iterations: u64,
    /// Wall-clock seconds consumed.
    pub seconds: f64,
}

impl ShrinkStats {
    /// Reports whether any reduction was accepted.
    #[must_use]
    pub const fn reduced(&self) -> bool {
        self.reduced_len < self.original_len
    }
}

// ============================================================================
// SECTION: Metadata
// ============================================================================

/// Report metadata payload.
///
/// # Invariants
/// - Version fields are engine constants; `extra` carries evaluation-scoped
///   values only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Report schema version.
    pub report_schema_version: String,
    /// Normalizer version in effect.
    pub normalizer_version: String,
    /// Side-effect registry version in effect.
    pub side_effect_registry_version: String,
    /// Whether the baseline skeleton was empty.
    pub refinement_skeleton_vacuous: bool,
    /// Warnings collected during spec resolution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Additional evaluation-scoped metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for ReportMetadata {
    fn default() -> Self {
        Self {
            report_schema_version: REPORT_SCHEMA_VERSION.to_string(),
            normalizer_version: NORMALIZER_VERSION.to_string(),
            side_effect_registry_version: SIDE_EFFECT_REGISTRY_VERSION.to_string(),
            refinement_skeleton_vacuous: false,
            warnings: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Report
// ============================================================================

/// Verdict report for one spec evaluation.
///
/// # Invariants
/// - `witness_index`, `failure_class`, and `primary_violation` are present
///   exactly when `trt_status` is FAIL.
/// - Serialization is deterministic for identical inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrtReport {
    /// Spec the verdict belongs to.
    pub spec_name: SpecName,
    /// Verdict status.
    pub trt_status: TrtStatus,
    /// Earliest witness event index (1-based `seq`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness_index: Option<u64>,
    /// Failure class of the primary violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_class: Option<FailureClass>,
    /// Deterministically chosen primary violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_violation: Option<Violation>,
    /// All violations anchored at the witness, tie-break ordered.
    #[serde(default)]
    pub all_violations_at_witness: Vec<Violation>,
    /// Every collected violation in emission order.
    #[serde(default)]
    pub violations: Vec<Violation>,
    /// Persisted counterexample artifact paths, keyed by artifact role.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub counterexample_paths: BTreeMap<String, String>,
    /// Command reproducing this evaluation offline.
    pub repro_command: String,
    /// Report metadata.
    pub metadata: ReportMetadata,
    /// Shrinker statistics, when the shrinker ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shrink_stats: Option<ShrinkStats>,
}

impl TrtReport {
    /// Creates a PASS report.
    #[must_use]
    pub fn pass(spec_name: SpecName, repro_command: String, metadata: ReportMetadata) -> Self {
        Self {
            spec_name,
            trt_status: TrtStatus::Pass,
            witness_index: None,
            failure_class: None,
            primary_violation: None,
            all_violations_at_witness: Vec::new(),
            violations: Vec::new(),
            counterexample_paths: BTreeMap::new(),
            repro_command,
            metadata,
            shrink_stats: None,
        }
    }

    /// Creates a FAIL report from a witness resolution.
    #[must_use]
    pub fn fail(
        spec_name: SpecName,
        repro_command: String,
        metadata: ReportMetadata,
        witness: &WitnessResolution,
        violations: Vec<Violation>,
    ) -> Self {
        Self {
            spec_name,
            trt_status: TrtStatus::Fail,
            witness_index: Some(witness.witness_index),
            failure_class: Some(witness.primary.failure_class),
            primary_violation: Some(witness.primary.clone()),
            all_violations_at_witness: witness.all_at_witness.clone(),
            violations,
            counterexample_paths: BTreeMap::new(),
            repro_command,
            metadata,
            shrink_stats: None,
        }
    }
}
