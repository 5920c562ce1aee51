// crates/tracegate-store-fs/src/store.rs
// ============================================================================
// Module: Filesystem Stores
// Description: Durable BaselineStore/ArtifactStore on a local state directory.
// Purpose: Persist baselines, fixtures, reports, and repros atomically.
// Dependencies: serde, serde_json, thiserror, time, tracegate-core
// ============================================================================

//! ## Overview
//! The default store layout is a local state directory with `baselines/`,
//! `fixtures/`, `current/`, `reports/`, `repros/`, and `tmp/` subdirectories.
//! Every write to a final location goes through a temp file in `tmp/`
//! followed by an atomic rename, so a crash never leaves a torn baseline.
//! Loads fail closed: a baseline whose metadata is missing or whose
//! normalizer version disagrees with the engine is reported as a version
//! mismatch, never silently used.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracegate_core::CanonicalNormalizer;
use tracegate_core::NORMALIZER_VERSION;
use tracegate_core::SpecName;
use tracegate_core::core::events::parse_jsonl;
use tracegate_core::core::events::render_jsonl;
use tracegate_core::interfaces::ArtifactStore;
use tracegate_core::interfaces::BaselineRecord;
use tracegate_core::interfaces::BaselineStore;
use tracegate_core::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default state directory name under the project root.
pub const STATE_DIR_NAME: &str = ".tracegate";

/// Subdirectories of the state directory, created by `init`.
pub const STATE_SUBDIRS: &[&str] =
    &["baselines", "current", "fixtures", "reports", "repros", "tmp"];

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the filesystem stores.
///
/// # Invariants
/// - `root` is the state directory itself, not the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsStoreConfig {
    /// State directory root.
    pub root: PathBuf,
}

impl FsStoreConfig {
    /// Builds the config for a project root, appending the state dir name.
    #[must_use]
    pub fn for_project(project_root: &Path) -> Self {
        Self {
            root: project_root.join(STATE_DIR_NAME),
        }
    }
}

// ============================================================================
// SECTION: Baseline Metadata
// ============================================================================

/// Metadata persisted alongside every baseline.
///
/// # Invariants
/// - `normalizer_version` is the version the baseline was recorded under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineMeta {
    /// Normalizer version at record time.
    pub normalizer_version: String,
    /// Spec the baseline belongs to.
    pub spec_name: SpecName,
    /// RFC3339 recording timestamp; diagnostic only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
}

// ============================================================================
// SECTION: Baseline Store
// ============================================================================

/// Filesystem-backed baseline store.
///
/// # Invariants
/// - Final writes are temp-file + rename; partial files live only in `tmp/`.
#[derive(Debug, Clone)]
pub struct FsBaselineStore {
    root: PathBuf,
}

impl FsBaselineStore {
    /// Creates the store, ensuring the directory layout exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the layout cannot be created.
    pub fn open(config: &FsStoreConfig) -> Result<Self, StoreError> {
        ensure_layout(&config.root)?;
        Ok(Self {
            root: config.root.clone(),
        })
    }

    /// Returns the state directory root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn trace_path(&self, spec_name: &SpecName) -> PathBuf {
        self.root.join("baselines").join(format!("{spec_name}.jsonl"))
    }

    fn meta_path(&self, spec_name: &SpecName) -> PathBuf {
        self.root.join("baselines").join(format!("{spec_name}.meta.json"))
    }

    fn fixture_path(&self, spec_name: &SpecName) -> PathBuf {
        self.root.join("fixtures").join(format!("{spec_name}.json"))
    }
}

impl BaselineStore for FsBaselineStore {
    fn resolve(&self, spec_name: &SpecName) -> Result<Option<BaselineRecord>, StoreError> {
        let trace_path = self.trace_path(spec_name);
        if !trace_path.exists() {
            return Ok(None);
        }
        let meta: BaselineMeta = read_json(&self.meta_path(spec_name))?;
        if meta.normalizer_version != NORMALIZER_VERSION {
            return Err(StoreError::VersionMismatch(format!(
                "baseline for {spec_name} recorded under normalizer {} (current {})",
                meta.normalizer_version, NORMALIZER_VERSION
            )));
        }
        let text = fs::read_to_string(&trace_path)
            .map_err(|error| StoreError::Io(error.to_string()))?;
        let normalizer = CanonicalNormalizer::without_redaction();
        let events = parse_jsonl(&text, &normalizer)
            .map_err(|error| StoreError::Corrupt(error.to_string()))?;
        let fixtures = read_json(&self.fixture_path(spec_name))?;
        Ok(Some(BaselineRecord {
            events,
            fixtures,
            normalizer_version: meta.normalizer_version,
        }))
    }

    fn write(&self, spec_name: &SpecName, record: &BaselineRecord) -> Result<(), StoreError> {
        let trace_text = render_jsonl(&record.events)
            .map_err(|error| StoreError::Invalid(error.to_string()))?;
        let meta = BaselineMeta {
            normalizer_version: record.normalizer_version.clone(),
            spec_name: spec_name.clone(),
            recorded_at: rfc3339_now(),
        };
        let meta_text = to_pretty_json(&meta)?;
        let fixture_text = to_pretty_json(&record.fixtures)?;

        write_atomic(&self.root, &self.trace_path(spec_name), trace_text.as_bytes())?;
        write_atomic(&self.root, &self.meta_path(spec_name), meta_text.as_bytes())?;
        write_atomic(&self.root, &self.fixture_path(spec_name), fixture_text.as_bytes())?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<SpecName>, StoreError> {
        let baselines = self.root.join("baselines");
        let mut names = Vec::new();
        let entries =
            fs::read_dir(&baselines).map_err(|error| StoreError::Io(error.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|error| StoreError::Io(error.to_string()))?;
            let path = entry.path();
            if path.extension().is_some_and(|extension| extension == "jsonl")
                && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            {
                names.push(SpecName::new(stem));
            }
        }
        names.sort();
        Ok(names)
    }
}

// ============================================================================
// SECTION: Artifact Store
// ============================================================================

/// Filesystem-backed artifact store rooted at the state directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Creates the store, ensuring the directory layout exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the layout cannot be created.
    pub fn open(config: &FsStoreConfig) -> Result<Self, StoreError> {
        ensure_layout(&config.root)?;
        Ok(Self {
            root: config.root.clone(),
        })
    }

    /// Returns the state directory root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_key(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
            return Err(StoreError::Invalid(format!("unsafe artifact key: {key}")));
        }
        Ok(self.root.join(key))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put_bytes(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let dest = self.resolve_key(key)?;
        write_atomic(&self.root, &dest, bytes)
    }

    fn put_file(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        let bytes = fs::read(path).map_err(|error| StoreError::Io(error.to_string()))?;
        self.put_bytes(key, &bytes)
    }

    fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve_key(key)?;
        fs::read(&path).map_err(|error| StoreError::Io(error.to_string()))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let base = if prefix.is_empty() { self.root.clone() } else { self.resolve_key(prefix)? };
        if !base.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        collect_files(&self.root, &base, &mut keys)?;
        keys.sort();
        Ok(keys)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Creates the state directory layout.
fn ensure_layout(root: &Path) -> Result<(), StoreError> {
    for subdir in STATE_SUBDIRS {
        fs::create_dir_all(root.join(subdir)).map_err(|error| StoreError::Io(error.to_string()))?;
    }
    Ok(())
}

/// Writes bytes through a temp file in `tmp/` and an atomic rename.
fn write_atomic(root: &Path, dest: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|error| StoreError::Io(error.to_string()))?;
    }
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StoreError::Invalid(format!("unsupported path: {}", dest.display())))?;
    let tmp_dir = root.join("tmp");
    fs::create_dir_all(&tmp_dir).map_err(|error| StoreError::Io(error.to_string()))?;
    let tmp_path = tmp_dir.join(format!("{file_name}.partial"));
    fs::write(&tmp_path, bytes).map_err(|error| StoreError::Io(error.to_string()))?;
    fs::rename(&tmp_path, dest).map_err(|error| StoreError::Io(error.to_string()))?;
    Ok(())
}

/// Reads and parses a JSON file.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let text = fs::read_to_string(path).map_err(|error| StoreError::Io(error.to_string()))?;
    serde_json::from_str(&text).map_err(|error| StoreError::Corrupt(error.to_string()))
}

/// Serializes a value as pretty JSON with a trailing newline.
fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    let mut text = serde_json::to_string_pretty(value)
        .map_err(|error| StoreError::Invalid(error.to_string()))?;
    text.push('\n');
    Ok(text)
}

/// Returns the current RFC3339 timestamp, when the clock is readable.
fn rfc3339_now() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}

/// Recursively collects file keys relative to the store root.
fn collect_files(root: &Path, base: &Path, keys: &mut Vec<String>) -> Result<(), StoreError> {
    let entries = fs::read_dir(base).map_err(|error| StoreError::Io(error.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|error| StoreError::Io(error.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, keys)?;
        } else if let Ok(relative) = path.strip_prefix(root)
            && let Some(key) = relative.to_str()
        {
            keys.push(key.to_string());
        }
    }
    Ok(())
}
