// crates/tracegate-store-fs/src/lib.rs
// ============================================================================
// Crate: tracegate-store-fs
// Description: Filesystem store backends for the Tracegate engine.
// Purpose: Durable baselines, fixtures, reports, and repros with atomic writes.
// Dependencies: serde, serde_json, thiserror, time, tracegate-core
// ============================================================================

//! ## Overview
//! Default [`tracegate_core::interfaces::BaselineStore`] and
//! [`tracegate_core::interfaces::ArtifactStore`] implementations rooted at a
//! local `.tracegate/` state directory. Writes to final locations go through
//! a temp file and rename to preserve atomicity against crashes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::BaselineMeta;
pub use store::FsArtifactStore;
pub use store::FsBaselineStore;
pub use store::FsStoreConfig;
pub use store::STATE_DIR_NAME;
pub use store::STATE_SUBDIRS;
