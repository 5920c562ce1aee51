// crates/tracegate-core/src/core/violation.rs
// ============================================================================
// Module: Violation Model
// Description: Violation records, failure classes, and stable codes.
// Purpose: Represent policy failures as data flowing through the resolver.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Failures are data, not control flow. Every check in the pipeline emits
//! violation records anchored to the smallest event index at which the
//! violation is observable; the resolver unions them and picks a
//! deterministic primary. Codes are stable ASCII identifiers and part of the
//! external contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Failure Classes
// ============================================================================

/// Violation failure classes.
///
/// # Invariants
/// - Variants are stable for serialization.
/// - [`FailureClass::rank`] defines the user-facing tie-break precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureClass {
    /// Behavioral divergence from the baseline skeleton.
    Refinement,
    /// Declared policy violation.
    Contract,
    /// Infrastructural failure.
    Tooling,
}

impl FailureClass {
    /// Returns the tie-break rank: REFINEMENT < CONTRACT < TOOLING.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Refinement => 0,
            Self::Contract => 1,
            Self::Tooling => 2,
        }
    }

    /// Returns the stable label for the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Refinement => "REFINEMENT",
            Self::Contract => "CONTRACT",
            Self::Tooling => "TOOLING",
        }
    }
}

// ============================================================================
// SECTION: Violation Codes
// ============================================================================

/// Stable violation code identifiers.
pub mod codes {
    /// Baseline skeleton call missing from the candidate.
    pub const REFINEMENT_BASELINE_CALL_MISSING: &str = "REFINEMENT_BASELINE_CALL_MISSING";
    /// Extra tool call not allowed by refinement policy.
    pub const REFINEMENT_EXTRA_TOOL_CALL: &str = "REFINEMENT_EXTRA_TOOL_CALL";
    /// Extra side-effect tool call not allowed by refinement policy.
    pub const REFINEMENT_EXTRA_SIDE_EFFECT_CALL: &str = "REFINEMENT_EXTRA_SIDE_EFFECT_CALL";
    /// New tool name forbidden by refinement policy.
    pub const REFINEMENT_NEW_TOOL_NAME_FORBIDDEN: &str = "REFINEMENT_NEW_TOOL_NAME_FORBIDDEN";

    /// Tool present in the deny list was called.
    pub const CONTRACT_TOOL_DENIED: &str = "CONTRACT_TOOL_DENIED";
    /// Tool absent from a non-empty allow list was called.
    pub const CONTRACT_TOOL_NOT_ALLOWED: &str = "CONTRACT_TOOL_NOT_ALLOWED";
    /// Total tool-call budget exceeded.
    pub const CONTRACT_MAX_CALLS_TOTAL_EXCEEDED: &str = "CONTRACT_MAX_CALLS_TOTAL_EXCEEDED";
    /// Per-tool call budget exceeded.
    pub const CONTRACT_MAX_CALLS_PER_TOOL_EXCEEDED: &str = "CONTRACT_MAX_CALLS_PER_TOOL_EXCEEDED";
    /// Required sequence name never observed.
    pub const CONTRACT_SEQUENCE_REQUIRED_MISSING: &str = "CONTRACT_SEQUENCE_REQUIRED_MISSING";
    /// Forbidden sequence name observed.
    pub const CONTRACT_SEQUENCE_NEVER_SEEN: &str = "CONTRACT_SEQUENCE_NEVER_SEEN";
    /// At-most-once name observed twice.
    pub const CONTRACT_SEQUENCE_AT_MOST_ONCE_EXCEEDED: &str =
        "CONTRACT_SEQUENCE_AT_MOST_ONCE_EXCEEDED";
    /// Ordered obligation violated.
    pub const SEQUENCE_REQUIRE_BEFORE: &str = "SEQUENCE_REQUIRE_BEFORE";
    /// Write-side-effect tool called while denied.
    pub const CONTRACT_WRITE_TOOL_DENIED: &str = "CONTRACT_WRITE_TOOL_DENIED";
    /// Outbound domain denied by network policy.
    pub const CONTRACT_NETWORK_DENIED: &str = "CONTRACT_NETWORK_DENIED";
    /// PII detected in an outbound payload.
    pub const CONTRACT_DATA_LEAK_PII: &str = "CONTRACT_DATA_LEAK_PII";
    /// Required argument key missing.
    pub const CONTRACT_ARG_REQUIRED_MISSING: &str = "CONTRACT_ARG_REQUIRED_MISSING";
    /// Argument value has the wrong type.
    pub const CONTRACT_ARG_TYPE: &str = "CONTRACT_ARG_TYPE";
    /// Argument value outside the permitted range.
    pub const CONTRACT_ARG_RANGE: &str = "CONTRACT_ARG_RANGE";
    /// Argument value outside the permitted set.
    pub const CONTRACT_ARG_ENUM: &str = "CONTRACT_ARG_ENUM";
    /// Argument value does not match the required pattern.
    pub const CONTRACT_ARG_REGEX: &str = "CONTRACT_ARG_REGEX";
    /// Final latency budget exceeded.
    pub const BUDGET_LATENCY_EXCEEDED: &str = "BUDGET_LATENCY_EXCEEDED";
    /// Tool-call budget threshold exceeded.
    pub const BUDGET_TOOL_CALLS_EXCEEDED: &str = "BUDGET_TOOL_CALLS_EXCEEDED";
    /// Token budget threshold exceeded.
    pub const BUDGET_TOKENS_EXCEEDED: &str = "BUDGET_TOKENS_EXCEEDED";

    /// No fixture matched a replayed request.
    pub const FIXTURE_EXHAUSTED: &str = "FIXTURE_EXHAUSTED";
    /// Baseline recorded under a different normalizer version.
    pub const NORMALIZER_VERSION_MISMATCH: &str = "NORMALIZER_VERSION_MISMATCH";
    /// Event failed structural validation.
    pub const INVALID_EVENT_SHAPE: &str = "INVALID_EVENT_SHAPE";
    /// Event declared an unsupported schema version.
    pub const SCHEMA_VERSION_UNSUPPORTED: &str = "SCHEMA_VERSION_UNSUPPORTED";
    /// Agent subprocess exceeded its wall-clock timeout.
    pub const RUN_TIMEOUT: &str = "RUN_TIMEOUT";
    /// Baseline write attempted in CI without an override.
    pub const CI_BASELINE_WRITE_DENIED: &str = "CI_BASELINE_WRITE_DENIED";
    /// Baseline absent for the spec.
    pub const BASELINE_MISSING: &str = "BASELINE_MISSING";
    /// Network egress attempted during offline replay.
    pub const REPLAY_NETWORK_BLOCKED: &str = "REPLAY_NETWORK_BLOCKED";
    /// Unexpected implementation error.
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

// ============================================================================
// SECTION: Violation Record
// ============================================================================

/// A single policy or tooling violation.
///
/// # Invariants
/// - `code` is a stable ASCII identifier from [`codes`].
/// - `event_index` is the 1-based `seq` of the earliest event at which the
///   violation is observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Stable violation code.
    pub code: String,
    /// Short human-readable message.
    pub message: String,
    /// Failure class.
    pub failure_class: FailureClass,
    /// Anchoring event `seq` (1-based).
    pub event_index: u64,
    /// Expected value or policy, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    /// Observed value, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<Value>,
    /// Optional remediation hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Violation {
    /// Creates a violation with the required fields.
    #[must_use]
    pub fn new(
        code: &str,
        failure_class: FailureClass,
        event_index: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            failure_class,
            event_index,
            expected: None,
            observed: None,
            hint: None,
        }
    }

    /// Attaches an expected value.
    #[must_use]
    pub fn with_expected(mut self, expected: Value) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Attaches an observed value.
    #[must_use]
    pub fn with_observed(mut self, observed: Value) -> Self {
        self.observed = Some(observed);
        self
    }

    /// Attaches a remediation hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
