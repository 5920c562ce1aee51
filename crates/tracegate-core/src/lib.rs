// crates/tracegate-core/src/lib.rs
// ============================================================================
// Crate: tracegate-core
// Description: Deterministic trajectory refinement testing core.
// Purpose: Canonical events, policy evaluation, and reproducible verdicts.
// Dependencies: bigdecimal, regex, serde, serde_json, sha2, thiserror, url
// ============================================================================

//! ## Overview
//! Tracegate records a known-good baseline trajectory for an agent command,
//! replays the command offline against recorded fixtures, and compares the
//! new trajectory to the baseline under a declared policy. The core crate
//! owns the canonical event model, the contract monitor, the refinement
//! checker, and the deterministic verdict resolver.
//!
//! Determinism is the central contract: for fixed inputs, repeated
//! evaluations produce bit-identical verdicts, witness indices, primary
//! codes, and counterexample prefixes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::hashing;
pub use crate::core::AbstractTrace;
pub use crate::core::AbstractionOptions;
pub use crate::core::CanonicalNormalizer;
pub use crate::core::CorrelationId;
pub use crate::core::EventKind;
pub use crate::core::EventType;
pub use crate::core::FailureClass;
pub use crate::core::FixturePolicy;
pub use crate::core::NORMALIZER_VERSION;
pub use crate::core::NormalizedEvent;
pub use crate::core::REDACTION_MARKER;
pub use crate::core::RefinementMode;
pub use crate::core::RefinementOptions;
pub use crate::core::ReplayMode;
pub use crate::core::ReportMetadata;
pub use crate::core::ResolvedSpec;
pub use crate::core::RunId;
pub use crate::core::SCHEMA_VERSION;
pub use crate::core::ShrinkStats;
pub use crate::core::SpecError;
pub use crate::core::SpecName;
pub use crate::core::ToolName;
pub use crate::core::TraceError;
pub use crate::core::TraceEvent;
pub use crate::core::TrtReport;
pub use crate::core::TrtStatus;
pub use crate::core::Violation;
pub use crate::core::WitnessResolution;
pub use crate::core::codes;
pub use crate::interfaces::ArtifactStore;
pub use crate::interfaces::BaselineRecord;
pub use crate::interfaces::BaselineStore;
pub use crate::interfaces::StoreError;
