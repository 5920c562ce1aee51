// crates/tracegate-core/src/core/hashing.rs
// ============================================================================
// Module: Canonical Hashing
// Description: Canonical JSON serialization and content hashing.
// Purpose: Provide stable, order-independent hashes for events, fixtures, and specs.
// Dependencies: serde, serde_json, sha2, thiserror
// ============================================================================

//! ## Overview
//! Canonical JSON is the hashing substrate for every content-addressed value
//! in Tracegate: object keys are sorted lexicographically at every depth,
//! arrays preserve order, strings use JSON-standard escapes with non-ASCII
//! characters escaped as `\uXXXX`, numbers use the shortest decimal form that
//! round-trips, and no insignificant whitespace is emitted. Two values with
//! identical semantic content always hash identically regardless of map
//! insertion order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default hash algorithm for all content hashes.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// Largest integer magnitude a double represents exactly.
const MAX_SAFE_INTEGER_F64: f64 = 9_007_199_254_740_992.0;

// ============================================================================
// SECTION: Hash Types
// ============================================================================

/// Hash algorithm identifiers.
///
/// # Invariants
/// - Variants are stable for serialization and report payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Returns the stable label for the algorithm.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }
}

/// Content hash digest with its producing algorithm.
///
/// # Invariants
/// - `hex` is the lowercase hexadecimal digest for `algorithm`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashDigest {
    /// Algorithm that produced the digest.
    pub algorithm: HashAlgorithm,
    /// Lowercase hexadecimal digest value.
    pub hex: String,
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.hex)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Canonicalization and hashing errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum HashError {
    /// The value cannot be canonicalized (non-finite number or serializer failure).
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
    /// The canonical payload exceeds the configured size limit.
    #[error("canonical payload too large: {actual_bytes} > {max_bytes}")]
    SizeLimitExceeded {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual canonical payload size in bytes.
        actual_bytes: usize,
    },
}

// ============================================================================
// SECTION: Canonical Serialization
// ============================================================================

/// Serializes a value into canonical JSON bytes.
///
/// # Errors
///
/// Returns [`HashError`] when the value contains a non-finite number or
/// cannot be represented as JSON.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    let value = serde_json::to_value(value)
        .map_err(|error| HashError::Canonicalization(error.to_string()))?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out.into_bytes())
}

/// Serializes a value into canonical JSON bytes, enforcing a size limit.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails or the output exceeds
/// `max_bytes`.
pub fn canonical_json_bytes_with_limit<T: Serialize>(
    value: &T,
    max_bytes: usize,
) -> Result<Vec<u8>, HashError> {
    let bytes = canonical_json_bytes(value)?;
    if bytes.len() > max_bytes {
        return Err(HashError::SizeLimitExceeded {
            max_bytes,
            actual_bytes: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Hashes the canonical JSON form of a value.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn hash_canonical_json<T: Serialize>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes the canonical JSON form of a value, enforcing a size limit.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails or the canonical payload
/// exceeds `max_bytes`.
pub fn hash_canonical_json_with_limit<T: Serialize>(
    algorithm: HashAlgorithm,
    value: &T,
    max_bytes: usize,
) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes_with_limit(value, max_bytes)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes raw bytes with the given algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            let digest = hasher.finalize();
            HashDigest {
                algorithm,
                hex: hex_lower(&digest),
            }
        }
    }
}

// ============================================================================
// SECTION: Canonical Writer
// ============================================================================

/// Writes the canonical form of a JSON value.
fn write_canonical(value: &Value, out: &mut String) -> Result<(), HashError> {
    match value {
        Value::Null => {
            out.push_str("null");
            Ok(())
        }
        Value::Bool(flag) => {
            out.push_str(if *flag { "true" } else { "false" });
            Ok(())
        }
        Value::Number(number) => write_canonical_number(number, out),
        Value::String(text) => {
            write_canonical_string(text, out);
            Ok(())
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
            Ok(())
        }
        Value::Object(map) => write_canonical_object(map, out),
    }
}

/// Writes an object with keys sorted lexicographically.
fn write_canonical_object(map: &Map<String, Value>, out: &mut String) -> Result<(), HashError> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_unstable();
    out.push('{');
    for (index, key) in keys.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        write_canonical_string(key, out);
        out.push(':');
        let Some(entry) = map.get(key.as_str()) else {
            return Err(HashError::Canonicalization(format!("missing object key: {key}")));
        };
        write_canonical(entry, out)?;
    }
    out.push('}');
    Ok(())
}

/// Writes a number in shortest round-trip decimal form.
///
/// Integral doubles collapse to integer form so `1.0` and `1` canonicalize
/// identically.
fn write_canonical_number(number: &Number, out: &mut String) -> Result<(), HashError> {
    if let Some(int) = number.as_i64() {
        out.push_str(&int.to_string());
        return Ok(());
    }
    if let Some(uint) = number.as_u64() {
        out.push_str(&uint.to_string());
        return Ok(());
    }
    let Some(float) = number.as_f64() else {
        return Err(HashError::Canonicalization(format!("unrepresentable number: {number}")));
    };
    if !float.is_finite() {
        return Err(HashError::Canonicalization("non-finite number".to_string()));
    }
    if float == float.trunc() && float.abs() <= MAX_SAFE_INTEGER_F64 {
        // Integral doubles canonicalize as integers.
        #[allow(
            clippy::cast_possible_truncation,
            reason = "Magnitude is bounded by the exact-integer range of f64."
        )]
        let as_int = float as i64;
        out.push_str(&as_int.to_string());
        return Ok(());
    }
    // Rust's float Display already produces the shortest round-trip form.
    out.push_str(&float.to_string());
    Ok(())
}

/// Writes a string with JSON-standard escapes and `\uXXXX` for non-ASCII.
fn write_canonical_string(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if (ch as u32) < 0x20 => {
                push_unicode_escape(out, ch as u32);
            }
            ch if ch.is_ascii() => out.push(ch),
            ch => {
                let mut units = [0_u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    push_unicode_escape(out, u32::from(*unit));
                }
            }
        }
    }
    out.push('"');
}

/// Appends a single `\uXXXX` escape for a UTF-16 code unit.
fn push_unicode_escape(out: &mut String, unit: u32) {
    out.push_str(&format!("\\u{unit:04x}"));
}

/// Renders bytes as lowercase hexadecimal.
fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
