// crates/tracegate-cli/src/lib.rs
// ============================================================================
// Crate: tracegate-cli
// Description: Orchestrator engine and rendering behind the tracegate binary.
// Purpose: Expose record/run workflows for the CLI and for integration tests.
// Dependencies: serde_json, thiserror, tracegate-core, tracegate-replay, tracegate-store-fs
// ============================================================================

//! ## Overview
//! The CLI crate hosts the orchestrator workflows (`record`, `run`, `init`,
//! `list`, `report`) and the Markdown renderer. The binary in `main.rs` is a
//! thin clap dispatcher over this library so tests can drive the same code
//! paths directly.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod engine;
pub mod render;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use engine::CommandOutcome;
pub use engine::ENV_CI;
pub use engine::EXIT_REGRESSION;
pub use engine::EXIT_SUCCESS;
pub use engine::EXIT_TOOLING;
pub use engine::EngineError;
pub use engine::ci_blocks_write;
pub use engine::exit_code_for;
pub use engine::init_workspace;
pub use engine::list_baselines;
pub use engine::load_spec;
pub use engine::record_spec;
pub use engine::run_spec;
pub use engine::show_report;
pub use render::render_markdown;
