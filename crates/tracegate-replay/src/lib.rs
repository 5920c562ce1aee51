// crates/tracegate-replay/src/lib.rs
// ============================================================================
// Crate: tracegate-replay
// Description: Deterministic replay plumbing for the Tracegate engine.
// Purpose: Fixtures, offline guard, event sink, and agent subprocess runner.
// Dependencies: serde, serde_json, thiserror, tracegate-core, url
// ============================================================================

//! ## Overview
//! This crate owns everything that touches the agent process boundary: the
//! fixture bundle and matcher that make replays deterministic, the offline
//! replay guard, the thread-safe event sink, and the subprocess runner that
//! captures the emitted JSONL trace. The evaluation pipeline itself lives in
//! `tracegate-core` and never touches these resources.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod fixtures;
pub mod guard;
pub mod runner;
pub mod sink;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use fixtures::FixtureBundle;
pub use fixtures::FixtureEntry;
pub use fixtures::FixtureError;
pub use fixtures::FixtureKind;
pub use fixtures::FixtureMatcher;
pub use fixtures::llm_signature;
pub use fixtures::tool_signature;
pub use guard::GuardError;
pub use guard::ReplayGuard;
pub use runner::ExecutionResult;
pub use runner::RunMode;
pub use runner::RunnerConfig;
pub use runner::RunnerError;
pub use runner::execute_spec;
pub use runner::split_command;
pub use sink::EmitSink;
pub use sink::SinkError;
pub use sink::read_trace_file;
