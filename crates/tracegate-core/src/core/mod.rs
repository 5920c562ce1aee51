// crates/tracegate-core/src/core/mod.rs
// ============================================================================
// Module: Tracegate Core Model
// Description: Canonical data model and pipeline components.
// Purpose: Group the event model, policy model, and checkers under one root.
// Dependencies: submodules only
// ============================================================================

//! ## Overview
//! The core model defines canonical events and hashes, the resolved spec,
//! the abstraction, the contract monitor, the refinement checker, the
//! witness resolver, and the shrinker. Components are pure and strictly
//! ordered; all I/O lives behind the store interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod abstraction;
pub mod canonical;
pub mod contracts;
pub mod events;
pub mod hashing;
pub mod identifiers;
pub mod predicates;
pub mod refinement;
pub mod report;
pub mod shrink;
pub mod spec;
pub mod violation;
pub mod witness;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use abstraction::AbstractTrace;
pub use abstraction::AbstractionOptions;
pub use abstraction::Predicates;
pub use abstraction::SkeletonStep;
pub use abstraction::Token;
pub use abstraction::TokenKind;
pub use abstraction::abstract_trace;
pub use canonical::CanonicalNormalizer;
pub use canonical::NORMALIZER_VERSION;
pub use canonical::NormalizerError;
pub use canonical::REDACTION_MARKER;
pub use canonical::VOLATILE_KEYS;
pub use contracts::evaluate_contracts;
pub use events::EventKind;
pub use events::EventType;
pub use events::NormalizedEvent;
pub use events::SCHEMA_VERSION;
pub use events::TraceError;
pub use events::TraceEvent;
pub use events::compute_event_id;
pub use events::normalize_event;
pub use events::normalize_trace;
pub use events::parse_jsonl;
pub use events::render_jsonl;
pub use events::validate_event;
pub use events::validate_trace;
pub use identifiers::CorrelationId;
pub use identifiers::RunId;
pub use identifiers::SpecName;
pub use identifiers::ToolName;
pub use refinement::RefinementOutcome;
pub use refinement::check_refinement;
pub use report::REPORT_SCHEMA_VERSION;
pub use report::ReportMetadata;
pub use report::ShrinkStats;
pub use report::TrtReport;
pub use report::TrtStatus;
pub use shrink::ShrinkError;
pub use shrink::ShrinkOutcome;
pub use shrink::ddmin_shrink;
pub use spec::ArgFieldSpec;
pub use spec::ArgSchema;
pub use spec::ArgType;
pub use spec::BudgetThresholds;
pub use spec::Contracts;
pub use spec::DataLeakContracts;
pub use spec::FixturePolicy;
pub use spec::LlmMatchMode;
pub use spec::NetworkContracts;
pub use spec::NetworkDefault;
pub use spec::RefinementMode;
pub use spec::RefinementOptions;
pub use spec::ReplayMode;
pub use spec::ReplayOptions;
pub use spec::RequireBefore;
pub use spec::ResolvedSpec;
pub use spec::SIDE_EFFECT_REGISTRY_VERSION;
pub use spec::SIDE_EFFECT_TOOL_REGISTRY_V1;
pub use spec::SequenceContracts;
pub use spec::ShrinkOptions;
pub use spec::SideEffectContracts;
pub use spec::SpecError;
pub use spec::ToolContracts;
pub use spec::ToolMatchMode;
pub use violation::FailureClass;
pub use violation::Violation;
pub use violation::codes;
pub use witness::WitnessResolution;
pub use witness::resolve_witness;
