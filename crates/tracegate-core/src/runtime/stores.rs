// crates/tracegate-core/src/runtime/stores.rs
// ============================================================================
// Module: In-Memory Stores
// Description: Map-backed store implementations for tests and embedding.
// Purpose: Provide deterministic, dependency-free store backends.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! In-memory stores back unit and scenario tests without touching the
//! filesystem. They honor the same interface contracts as the durable
//! backends: atomic replace on write, sorted listings, fail-closed reads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use crate::core::identifiers::SpecName;
use crate::interfaces::ArtifactStore;
use crate::interfaces::BaselineRecord;
use crate::interfaces::BaselineStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Baseline Store
// ============================================================================

/// Map-backed baseline store.
#[derive(Debug, Default)]
pub struct InMemoryBaselineStore {
    records: Mutex<BTreeMap<SpecName, BaselineRecord>>,
}

impl InMemoryBaselineStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BaselineStore for InMemoryBaselineStore {
    fn resolve(&self, spec_name: &SpecName) -> Result<Option<BaselineRecord>, StoreError> {
        let records =
            self.records.lock().map_err(|_| StoreError::Io("store lock poisoned".to_string()))?;
        Ok(records.get(spec_name).cloned())
    }

    fn write(&self, spec_name: &SpecName, record: &BaselineRecord) -> Result<(), StoreError> {
        let mut records =
            self.records.lock().map_err(|_| StoreError::Io("store lock poisoned".to_string()))?;
        records.insert(spec_name.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<SpecName>, StoreError> {
        let records =
            self.records.lock().map_err(|_| StoreError::Io("store lock poisoned".to_string()))?;
        Ok(records.keys().cloned().collect())
    }
}

// ============================================================================
// SECTION: Artifact Store
// ============================================================================

/// Map-backed artifact store.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut artifacts = self
            .artifacts
            .lock()
            .map_err(|_| StoreError::Io("artifact lock poisoned".to_string()))?;
        artifacts.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn put_file(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        let bytes = std::fs::read(path).map_err(|error| StoreError::Io(error.to_string()))?;
        self.put_bytes(key, &bytes)
    }

    fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let artifacts = self
            .artifacts
            .lock()
            .map_err(|_| StoreError::Io("artifact lock poisoned".to_string()))?;
        artifacts
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::Invalid(format!("artifact not found: {key}")))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let artifacts = self
            .artifacts
            .lock()
            .map_err(|_| StoreError::Io("artifact lock poisoned".to_string()))?;
        Ok(artifacts.keys().filter(|key| key.starts_with(prefix)).cloned().collect())
    }
}
