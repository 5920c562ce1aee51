// crates/tracegate-core/src/core/canonical.rs
// ============================================================================
// Module: Canonical Normalizer
// Description: Volatile stripping and redaction ahead of hashing.
// Purpose: Make hashes and predicates invariant under nondeterministic fields.
// Dependencies: regex, serde_json, crate::core::hashing
// ============================================================================

//! ## Overview
//! The normalizer removes fields that are nondeterministic by construction
//! (relative timestamps, run identifiers, latency measurements, process ids)
//! and applies spec-declared redaction patterns to keys and string values.
//! Redaction runs before hashing, before predicate extraction, and before any
//! contract scan of outbound strings; a redactable substring must never be
//! able to influence a fixture key.
//!
//! The normalizer carries a version string persisted with every baseline. A
//! baseline recorded under a different normalizer version is unusable and
//! fails fast during replay.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Normalizer version persisted with every baseline and report.
pub const NORMALIZER_VERSION: &str = "1";

/// Marker substituted for redacted content.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Keys stripped as volatile at every nesting depth, in sorted order.
pub const VOLATILE_KEYS: &[&str] = &[
    "created_at",
    "duration_ms",
    "event_id",
    "latency_ms",
    "monotonic_ts",
    "pid",
    "rel_ms",
    "request_id",
    "run_id",
    "timestamp",
    "updated_at",
];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Normalizer construction errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum NormalizerError {
    /// A redaction pattern failed to compile.
    #[error("invalid redact pattern '{pattern}': {message}")]
    InvalidRedactPattern {
        /// The offending pattern source.
        pattern: String,
        /// Compiler error message.
        message: String,
    },
}

// ============================================================================
// SECTION: Canonical Normalizer
// ============================================================================

/// Normalizer applying volatile stripping and redaction.
///
/// # Invariants
/// - `strip` is pure and deterministic; output maps iterate in sorted order.
/// - Redaction is applied to both keys and string values.
#[derive(Debug)]
pub struct CanonicalNormalizer {
    /// Compiled redaction patterns, in spec order.
    redact: Vec<Regex>,
}

impl CanonicalNormalizer {
    /// Builds a normalizer from spec-declared redaction patterns.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizerError`] when a pattern does not compile.
    pub fn new(redact_patterns: &[String]) -> Result<Self, NormalizerError> {
        let mut redact = Vec::with_capacity(redact_patterns.len());
        for pattern in redact_patterns {
            let compiled =
                Regex::new(pattern).map_err(|error| NormalizerError::InvalidRedactPattern {
                    pattern: pattern.clone(),
                    message: error.to_string(),
                })?;
            redact.push(compiled);
        }
        Ok(Self {
            redact,
        })
    }

    /// Builds a normalizer with no redaction patterns.
    #[must_use]
    pub fn without_redaction() -> Self {
        Self {
            redact: Vec::new(),
        }
    }

    /// Returns the normalizer version string.
    #[must_use]
    pub const fn version(&self) -> &'static str {
        NORMALIZER_VERSION
    }

    /// Strips volatile keys and applies redaction at every depth.
    ///
    /// Object keys matching a redaction pattern survive with the matched
    /// substring replaced; keys in [`VOLATILE_KEYS`] are removed entirely.
    #[must_use]
    pub fn strip(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut stripped = Map::new();
                // serde_json maps iterate in sorted key order.
                for (key, entry) in map {
                    if VOLATILE_KEYS.contains(&key.as_str()) {
                        continue;
                    }
                    stripped.insert(self.redact_text(key), self.strip(entry));
                }
                Value::Object(stripped)
            }
            Value::Array(items) => Value::Array(items.iter().map(|item| self.strip(item)).collect()),
            Value::String(text) => Value::String(self.redact_text(text)),
            other => other.clone(),
        }
    }

    /// Applies redaction to string values only, without volatile stripping.
    #[must_use]
    pub fn redact_only(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut redacted = Map::new();
                for (key, entry) in map {
                    redacted.insert(self.redact_text(key), self.redact_only(entry));
                }
                Value::Object(redacted)
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.redact_only(item)).collect())
            }
            Value::String(text) => Value::String(self.redact_text(text)),
            other => other.clone(),
        }
    }

    /// Replaces every redaction-pattern match in `text` with the marker.
    #[must_use]
    pub fn redact_text(&self, text: &str) -> String {
        let mut current = text.to_string();
        for pattern in &self.redact {
            current = pattern.replace_all(&current, REDACTION_MARKER).into_owned();
        }
        current
    }

    /// Hashes the stripped canonical form of a value.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn stable_hash(&self, value: &Value) -> Result<String, HashError> {
        let stripped = self.strip(value);
        Ok(hash_canonical_json(DEFAULT_HASH_ALGORITHM, &stripped)?.hex)
    }
}
