// crates/tracegate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Store Interfaces
// Description: Backend-agnostic interfaces for baseline and artifact storage.
// Purpose: Define the narrow persistence seams used by the orchestrator.
// Dependencies: serde, serde_json, thiserror, crate::core
// ============================================================================

//! ## Overview
//! The engine depends on two narrow persistence interfaces: a baseline store
//! resolving recorded traces with their fixtures and normalizer version, and
//! an artifact store for reports and repro bundles. Implementations must be
//! deterministic and fail closed on missing or corrupt data. Fixture payloads
//! are opaque canonical JSON at this seam; the replay layer owns their typed
//! form.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::events::TraceEvent;
use crate::core::identifiers::SpecName;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Stored data version is incompatible.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Baseline Store
// ============================================================================

/// A resolved baseline: trace, fixtures, and recording metadata.
///
/// # Invariants
/// - `normalizer_version` is the version the baseline was recorded under.
/// - `fixtures` is opaque canonical JSON owned by the replay layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    /// Recorded baseline trace.
    pub events: Vec<TraceEvent>,
    /// Recorded fixture bundle in its serialized form.
    pub fixtures: Value,
    /// Normalizer version at record time.
    pub normalizer_version: String,
}

/// Baseline persistence interface.
pub trait BaselineStore {
    /// Resolves the baseline for a spec, when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails or stored data is corrupt.
    fn resolve(&self, spec_name: &SpecName) -> Result<Option<BaselineRecord>, StoreError>;

    /// Writes a baseline atomically, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persisting fails.
    fn write(&self, spec_name: &SpecName, record: &BaselineRecord) -> Result<(), StoreError>;

    /// Lists spec names with a recorded baseline, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list(&self) -> Result<Vec<SpecName>, StoreError>;
}

// ============================================================================
// SECTION: Artifact Store
// ============================================================================

/// Artifact persistence interface for reports and repros.
pub trait ArtifactStore {
    /// Writes bytes under a key, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when writing fails.
    fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Copies a file under a key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when copying fails.
    fn put_file(&self, key: &str, path: &Path) -> Result<(), StoreError>;

    /// Reads the bytes stored under a key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the key is absent or reading fails.
    fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Lists keys under a prefix, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
