// crates/tracegate-core/src/core/spec.rs
// ============================================================================
// Module: Resolved Spec Model
// Description: Typed model of a fully-resolved agent spec.
// Purpose: Provide the immutable policy input consumed by the pipeline.
// Dependencies: serde, serde_json, regex, thiserror, crate::core::{events, identifiers}
// ============================================================================

//! ## Overview
//! The core consumes a fully-resolved spec object; inheritance and merging
//! happen upstream. Unknown top-level keys are collected as report warnings,
//! while unknown keys inside a recognized section are rejected as a tooling
//! error. All collections use sorted containers so policy iteration is
//! deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::PathBuf;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Number;
use serde_json::Value;
use thiserror::Error;

use crate::core::canonical::CanonicalNormalizer;
use crate::core::canonical::NormalizerError;
use crate::core::events::EventKind;
use crate::core::identifiers::SpecName;
use crate::core::identifiers::ToolName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Built-in side-effect tool registry, version 1.
pub const SIDE_EFFECT_TOOL_REGISTRY_V1: &[&str] =
    &["checkout", "create_refund", "db_write", "filesystem_write", "http_request", "send_email"];

/// Version label for the built-in side-effect registry.
pub const SIDE_EFFECT_REGISTRY_VERSION: &str = "1";

/// Default shrinker wall-clock budget in seconds.
pub const DEFAULT_SHRINK_MAX_SECONDS: f64 = 5.0;

/// Default shrinker iteration budget.
pub const DEFAULT_SHRINK_MAX_ITERATIONS: u64 = 200;

/// Default agent subprocess wall-clock timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

// ============================================================================
// SECTION: Replay Options
// ============================================================================

/// Fixture keying policy.
///
/// # Invariants
/// - Variants are stable for serialization and baseline metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixturePolicy {
    /// Key fixtures by request signature hash.
    #[default]
    ByHash,
    /// Key fixtures by kind-restricted emission order.
    ByIndex,
}

/// Replay connectivity mode.
///
/// # Invariants
/// - Variants are stable for serialization and guard configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Offline replay; outbound network is blocked.
    #[default]
    Offline,
    /// Online replay; no network guard is installed.
    Online,
}

/// LLM fixture matching mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmMatchMode {
    /// Match on the request signature.
    #[default]
    SignatureMatch,
    /// Match on kind-restricted emission order.
    SequenceMatch,
}

/// Tool fixture matching mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMatchMode {
    /// Match on `(tool_name, canonical(args))`.
    #[default]
    ArgsSignatureMatch,
    /// Match on kind-restricted emission order.
    SequenceMatch,
}

/// Replay configuration section.
///
/// # Invariants
/// - Unknown keys are rejected during deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayOptions {
    /// Connectivity mode; defaults to offline.
    #[serde(default)]
    pub mode: ReplayMode,
    /// Require fixture matches to respect emission order.
    #[serde(default)]
    pub strict_sequence: bool,
    /// LLM fixture matching mode.
    #[serde(default)]
    pub llm_match_mode: LlmMatchMode,
    /// Tool fixture matching mode.
    #[serde(default)]
    pub tool_match_mode: ToolMatchMode,
}

// ============================================================================
// SECTION: Refinement Options
// ============================================================================

/// Refinement checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementMode {
    /// Refinement checking disabled.
    None,
    /// Skeleton subsequence refinement.
    #[default]
    Skeleton,
    /// Exact skeleton equality.
    Strict,
}

/// Refinement configuration section.
///
/// # Invariants
/// - Unknown keys are rejected during deserialization.
/// - Tool sets iterate in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefinementOptions {
    /// Checking mode; defaults to skeleton.
    #[serde(default)]
    pub mode: RefinementMode,
    /// Permit candidate runs to add LLM steps.
    #[serde(default = "default_true")]
    pub allow_extra_llm_steps: bool,
    /// Tool names exempt from extra-call rejection.
    #[serde(default)]
    pub allow_extra_tools: BTreeSet<ToolName>,
    /// Side-effect tool names exempt from extra-call rejection.
    #[serde(default)]
    pub allow_extra_side_effect_tools: BTreeSet<ToolName>,
    /// Permit tool names absent from the baseline.
    #[serde(default)]
    pub allow_new_tool_names: bool,
    /// Tool names stripped before skeleton extraction on both sides.
    #[serde(default)]
    pub ignore_call_tools: BTreeSet<ToolName>,
}

impl Default for RefinementOptions {
    fn default() -> Self {
        Self {
            mode: RefinementMode::default(),
            allow_extra_llm_steps: true,
            allow_extra_tools: BTreeSet::new(),
            allow_extra_side_effect_tools: BTreeSet::new(),
            allow_new_tool_names: false,
            ignore_call_tools: BTreeSet::new(),
        }
    }
}

const fn default_true() -> bool {
    true
}

// ============================================================================
// SECTION: Contract Options
// ============================================================================

/// Tool allow/deny policy and call budgets.
///
/// # Invariants
/// - `allow` acts as an allowlist only when non-empty.
/// - `allow` and `deny` must not overlap (validated at resolve time).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolContracts {
    /// Allowlist of tool names (empty means allow all).
    #[serde(default)]
    pub allow: BTreeSet<ToolName>,
    /// Denylist of tool names.
    #[serde(default)]
    pub deny: BTreeSet<ToolName>,
    /// Budget for total tool calls.
    #[serde(default)]
    pub max_calls_total: Option<u64>,
    /// Per-tool call budgets.
    #[serde(default)]
    pub max_calls_per_tool: BTreeMap<ToolName, u64>,
}

/// Ordered `before`/`after` obligation.
///
/// # Invariants
/// - The first `before` occurrence must precede the first `after` occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequireBefore {
    /// Tool that must appear first.
    pub before: ToolName,
    /// Tool that must appear after.
    pub after: ToolName,
}

/// Sequence obligations over tool names.
///
/// # Invariants
/// - Unknown keys are rejected during deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceContracts {
    /// Names that must each appear at least once.
    #[serde(default)]
    pub require: Vec<ToolName>,
    /// Names forbidden anywhere.
    #[serde(default)]
    pub forbid: Vec<ToolName>,
    /// Ordered obligations.
    #[serde(default)]
    pub require_before: Vec<RequireBefore>,
    /// Names required somewhere (alias family of `require`).
    #[serde(default)]
    pub eventually: Vec<ToolName>,
    /// Names forbidden anywhere (alias family of `forbid`).
    #[serde(default)]
    pub never: Vec<ToolName>,
    /// Names allowed at most once.
    #[serde(default)]
    pub at_most_once: Vec<ToolName>,
}

/// Side-effect policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SideEffectContracts {
    /// Forbid calls to tools tagged as write-side-effect.
    #[serde(default)]
    pub deny_write_tools: bool,
}

/// Default network posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkDefault {
    /// Outbound domains are allowed unless denied elsewhere.
    #[default]
    Allow,
    /// Outbound domains are denied unless allowlisted.
    Deny,
}

/// Network contract section.
///
/// # Invariants
/// - `allowlist` is accepted as a synonym for `allow_domains`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkContracts {
    /// Default posture for outbound domains.
    #[serde(default, rename = "default")]
    pub policy: NetworkDefault,
    /// Exact-match hostname allowlist.
    #[serde(default, alias = "allowlist")]
    pub allow_domains: BTreeSet<String>,
}

/// Data-leak contract section.
///
/// # Invariants
/// - `outbound_kinds` is restricted to `TOOL_CALL` and `LLM_REQUEST`
///   (validated at resolve time); empty means both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataLeakContracts {
    /// Forbid PII in outbound payloads.
    #[serde(default)]
    pub deny_pii_outbound: bool,
    /// Outbound event kinds to scan.
    #[serde(default)]
    pub outbound_kinds: BTreeSet<EventKind>,
}

/// Argument value types recognized by arg schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// JSON number with zero fraction.
    Integer,
    /// JSON boolean.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ArgType {
    /// Returns the stable label for the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// Per-field argument constraints.
///
/// # Invariants
/// - `regex`, when present, must compile (validated at resolve time).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgFieldSpec {
    /// Expected JSON type.
    #[serde(default, rename = "type")]
    pub field_type: Option<ArgType>,
    /// Inclusive numeric lower bound.
    #[serde(default)]
    pub min: Option<Number>,
    /// Inclusive numeric upper bound.
    #[serde(default)]
    pub max: Option<Number>,
    /// Permitted values.
    #[serde(default, rename = "enum")]
    pub allowed: Option<Vec<Value>>,
    /// Pattern the full string value must match.
    #[serde(default)]
    pub regex: Option<String>,
}

/// Per-tool argument schema.
///
/// # Invariants
/// - Applies to the `input.kwargs` map of `tool_called` payloads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArgSchema {
    /// Keys that must be present.
    #[serde(default)]
    pub required: Vec<String>,
    /// Per-field constraints.
    #[serde(default)]
    pub fields: BTreeMap<String, ArgFieldSpec>,
}

/// Full contract section.
///
/// # Invariants
/// - Unknown keys are rejected during deserialization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contracts {
    /// Tool allow/deny policy and budgets.
    #[serde(default)]
    pub tools: ToolContracts,
    /// Sequence obligations.
    #[serde(default)]
    pub sequence: SequenceContracts,
    /// Side-effect policy.
    #[serde(default)]
    pub side_effects: SideEffectContracts,
    /// Network policy.
    #[serde(default)]
    pub network: NetworkContracts,
    /// Data-leak policy.
    #[serde(default)]
    pub data_leak: DataLeakContracts,
    /// Per-tool argument schemas.
    #[serde(default)]
    pub args: BTreeMap<ToolName, ArgSchema>,
}

// ============================================================================
// SECTION: Budgets and Shrink
// ============================================================================

/// Run-level budget thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetThresholds {
    /// Maximum final `rel_ms`.
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    /// Maximum tool call count.
    #[serde(default)]
    pub max_tool_calls: Option<u64>,
    /// Maximum cumulative LLM tokens.
    #[serde(default)]
    pub max_tokens: Option<u64>,
}

/// Shrinker budget.
///
/// # Invariants
/// - Both bounds must be positive (validated at resolve time).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShrinkOptions {
    /// Wall-clock budget in seconds.
    #[serde(default = "default_shrink_seconds")]
    pub max_seconds: f64,
    /// Iteration budget.
    #[serde(default = "default_shrink_iterations")]
    pub max_iterations: u64,
}

impl Default for ShrinkOptions {
    fn default() -> Self {
        Self {
            max_seconds: DEFAULT_SHRINK_MAX_SECONDS,
            max_iterations: DEFAULT_SHRINK_MAX_ITERATIONS,
        }
    }
}

const fn default_shrink_seconds() -> f64 {
    DEFAULT_SHRINK_MAX_SECONDS
}

const fn default_shrink_iterations() -> u64 {
    DEFAULT_SHRINK_MAX_ITERATIONS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Spec resolution errors. These are TOOLING failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SpecError {
    /// The spec object is not a JSON object or misses required fields.
    #[error("invalid spec: {0}")]
    Invalid(String),
    /// A recognized section failed to deserialize (unknown key or bad type).
    #[error("invalid spec section: {0}")]
    Section(String),
    /// Tool allow/deny lists overlap.
    #[error("contracts.tools allow/deny overlap: {names}")]
    ToolPolicyOverlap {
        /// Sorted, comma-joined overlapping names.
        names: String,
    },
    /// An outbound kind outside `TOOL_CALL`/`LLM_REQUEST` was configured.
    #[error("contracts.data_leak.outbound_kinds does not accept {kind}")]
    InvalidOutboundKind {
        /// Offending kind label.
        kind: String,
    },
    /// An arg-schema regex failed to compile.
    #[error("contracts.args regex for {tool}.{field} is invalid: {message}")]
    InvalidArgRegex {
        /// Tool the schema belongs to.
        tool: String,
        /// Field carrying the pattern.
        field: String,
        /// Compiler error message.
        message: String,
    },
    /// A redaction pattern failed to compile.
    #[error(transparent)]
    Redact(#[from] NormalizerError),
    /// Shrink bounds are not positive.
    #[error("shrink bounds must be positive")]
    InvalidShrinkBounds,
}

// ============================================================================
// SECTION: Resolved Spec
// ============================================================================

/// Fully-resolved, immutable spec consumed by the pipeline.
///
/// # Invariants
/// - All cross-field validation has passed; regex patterns compile.
/// - Collections iterate in sorted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSpec {
    /// Stable spec identifier.
    pub name: SpecName,
    /// Agent process invocation, opaque beyond being callable.
    pub command: String,
    /// Spec schema version; opaque metadata.
    #[serde(default)]
    pub schema_version: Option<String>,
    /// Working directory for the agent process.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Environment for the agent process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Fixture keying policy.
    #[serde(default)]
    pub fixture_policy: FixturePolicy,
    /// Replay configuration.
    #[serde(default)]
    pub replay: ReplayOptions,
    /// Refinement configuration.
    #[serde(default)]
    pub refinement: RefinementOptions,
    /// Contract obligations.
    #[serde(default)]
    pub contracts: Contracts,
    /// Run-level budgets.
    #[serde(default)]
    pub budget_thresholds: BudgetThresholds,
    /// Redaction patterns applied before hashing and predicate extraction.
    #[serde(default)]
    pub redact: Vec<String>,
    /// Tool names tagged as side-effecting.
    #[serde(default = "default_side_effect_tools")]
    pub side_effect_tools: BTreeSet<ToolName>,
    /// Shrinker budget.
    #[serde(default)]
    pub shrink: ShrinkOptions,
    /// Agent subprocess wall-clock timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_side_effect_tools() -> BTreeSet<ToolName> {
    SIDE_EFFECT_TOOL_REGISTRY_V1.iter().map(|name| ToolName::new(*name)).collect()
}

const fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Raw top-level shape used to separate recognized options from unknowns.
#[derive(Debug, Deserialize)]
struct RawSpec {
    name: SpecName,
    command: String,
    #[serde(default)]
    schema_version: Option<String>,
    #[serde(default)]
    workdir: Option<PathBuf>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    fixture_policy: FixturePolicy,
    #[serde(default)]
    replay: ReplayOptions,
    #[serde(default)]
    refinement: RefinementOptions,
    #[serde(default)]
    contracts: Contracts,
    #[serde(default)]
    budget_thresholds: BudgetThresholds,
    #[serde(default)]
    redact: Vec<String>,
    #[serde(default)]
    side_effect_tools: Option<BTreeSet<ToolName>>,
    #[serde(default)]
    shrink: ShrinkOptions,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

impl ResolvedSpec {
    /// Resolves a spec from its JSON object form.
    ///
    /// Returns the resolved spec together with warnings for ignored unknown
    /// top-level keys.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when a required field is missing, a recognized
    /// section carries unknown keys, or cross-field validation fails.
    pub fn from_value(value: &Value) -> Result<(Self, Vec<String>), SpecError> {
        if !value.is_object() {
            return Err(SpecError::Invalid("spec must be a JSON object".to_string()));
        }
        let raw: RawSpec = serde_json::from_value(value.clone())
            .map_err(|error| SpecError::Section(error.to_string()))?;
        if raw.command.trim().is_empty() {
            return Err(SpecError::Invalid("command must be non-empty".to_string()));
        }

        let warnings: Vec<String> = raw
            .unknown
            .keys()
            .map(|key| format!("unknown top-level spec key ignored: {key}"))
            .collect();

        let spec = Self {
            name: raw.name,
            command: raw.command,
            schema_version: raw.schema_version,
            workdir: raw.workdir,
            env: raw.env,
            fixture_policy: raw.fixture_policy,
            replay: raw.replay,
            refinement: raw.refinement,
            contracts: raw.contracts,
            budget_thresholds: raw.budget_thresholds,
            redact: raw.redact,
            side_effect_tools: raw.side_effect_tools.unwrap_or_else(default_side_effect_tools),
            shrink: raw.shrink,
            timeout_seconds: raw.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        };
        spec.validate()?;
        Ok((spec, warnings))
    }

    /// Validates cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] for overlap, pattern, kind, or bound failures.
    pub fn validate(&self) -> Result<(), SpecError> {
        let overlap: Vec<&ToolName> =
            self.contracts.tools.allow.intersection(&self.contracts.tools.deny).collect();
        if !overlap.is_empty() {
            let names =
                overlap.iter().map(|name| name.as_str()).collect::<Vec<&str>>().join(", ");
            return Err(SpecError::ToolPolicyOverlap {
                names,
            });
        }
        for kind in &self.contracts.data_leak.outbound_kinds {
            if !matches!(kind, EventKind::ToolCall | EventKind::LlmRequest) {
                return Err(SpecError::InvalidOutboundKind {
                    kind: kind.as_str().to_string(),
                });
            }
        }
        for (tool, schema) in &self.contracts.args {
            for (field, field_spec) in &schema.fields {
                if let Some(pattern) = &field_spec.regex {
                    Regex::new(pattern).map_err(|error| SpecError::InvalidArgRegex {
                        tool: tool.as_str().to_string(),
                        field: field.clone(),
                        message: error.to_string(),
                    })?;
                }
            }
        }
        // Compiling the normalizer validates every redact pattern.
        CanonicalNormalizer::new(&self.redact)?;
        if self.shrink.max_seconds <= 0.0 || self.shrink.max_iterations == 0 {
            return Err(SpecError::InvalidShrinkBounds);
        }
        Ok(())
    }

    /// Builds the canonical normalizer for this spec's redaction patterns.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when a redaction pattern does not compile.
    pub fn normalizer(&self) -> Result<CanonicalNormalizer, SpecError> {
        Ok(CanonicalNormalizer::new(&self.redact)?)
    }

    /// Returns the effective outbound kinds for data-leak scanning.
    #[must_use]
    pub fn outbound_kinds(&self) -> BTreeSet<EventKind> {
        if self.contracts.data_leak.outbound_kinds.is_empty() {
            return BTreeSet::from([EventKind::ToolCall, EventKind::LlmRequest]);
        }
        self.contracts.data_leak.outbound_kinds.clone()
    }
}
