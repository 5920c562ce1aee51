// crates/tracegate-core/tests/hashing.rs
// ============================================================================
// Module: Canonical Hashing Tests
// Description: Verifies canonical JSON serialization and hashing behavior.
// ============================================================================
//! ## Overview
//! Ensures canonical JSON hashing is deterministic across key ordering,
//! numeric normalization, and size limits, and escapes non-ASCII content.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use serde_json::json;
use tracegate_core::hashing::DEFAULT_HASH_ALGORITHM;
use tracegate_core::hashing::HashAlgorithm;
use tracegate_core::hashing::HashError;
use tracegate_core::hashing::canonical_json_bytes;
use tracegate_core::hashing::canonical_json_bytes_with_limit;
use tracegate_core::hashing::hash_bytes;
use tracegate_core::hashing::hash_canonical_json;

fn canonical_text(value: &serde_json::Value) -> String {
    let bytes = canonical_json_bytes(value).expect("canonical");
    String::from_utf8(bytes).expect("canonical output is UTF-8")
}

#[test]
fn canonical_hash_is_order_independent_for_maps() {
    let value_a: serde_json::Value =
        serde_json::from_str("{\"b\": 2, \"a\": 1, \"nested\": {\"y\": true, \"x\": false}}")
            .expect("parse a");
    let value_b: serde_json::Value =
        serde_json::from_str("{\"nested\": {\"x\": false, \"y\": true}, \"a\": 1, \"b\": 2}")
            .expect("parse b");

    let hash_a = hash_canonical_json(HashAlgorithm::Sha256, &value_a).expect("hash a");
    let hash_b = hash_canonical_json(HashAlgorithm::Sha256, &value_b).expect("hash b");

    assert_eq!(hash_a, hash_b);
}

#[test]
fn canonical_hash_normalizes_integral_floats() {
    let hash_a = hash_canonical_json(HashAlgorithm::Sha256, &json!(1.0)).expect("hash a");
    let hash_b = hash_canonical_json(HashAlgorithm::Sha256, &json!(1)).expect("hash b");
    assert_eq!(hash_a, hash_b);
}

#[test]
fn canonical_bytes_have_no_insignificant_whitespace() {
    assert_eq!(canonical_text(&json!({"b": [1, 2], "a": "x"})), "{\"a\":\"x\",\"b\":[1,2]}");
}

#[test]
fn canonical_bytes_sort_keys_at_every_depth() {
    let value = json!({"outer": {"b": 1, "a": {"d": 2, "c": 3}}});
    assert_eq!(canonical_text(&value), "{\"outer\":{\"a\":{\"c\":3,\"d\":2},\"b\":1}}");
}

#[test]
fn canonical_bytes_escape_non_ascii() {
    let value = json!({"note": "caf\u{e9}"});
    assert_eq!(canonical_text(&value), "{\"note\":\"caf\\u00e9\"}");
}

#[test]
fn canonical_bytes_escape_control_characters() {
    let value = json!("line\nbreak\u{1}");
    assert_eq!(canonical_text(&value), "\"line\\nbreak\\u0001\"");
}

#[test]
fn canonical_bytes_escape_astral_plane_as_surrogate_pair() {
    let value = json!("ok \u{1F600}");
    assert_eq!(canonical_text(&value), "\"ok \\ud83d\\ude00\"");
}

#[test]
fn canonical_float_uses_shortest_round_trip_form() {
    assert_eq!(canonical_text(&json!(0.25)), "0.25");
}

#[test]
fn canonical_hash_respects_size_limit() {
    let payload = json!({"data": "x".repeat(64)});
    let err = canonical_json_bytes_with_limit(&payload, 16).unwrap_err();
    assert!(matches!(err, HashError::SizeLimitExceeded { .. }));
}

#[test]
fn canonical_serialization_is_idempotent() {
    let value = json!({"b": {"z": [3, 2, 1]}, "a": 0.5});
    let once = canonical_text(&value);
    let reparsed: serde_json::Value = serde_json::from_str(&once).expect("canonical parses");
    assert_eq!(once, canonical_text(&reparsed));
}

#[test]
fn hash_bytes_is_stable_lowercase_hex() {
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, b"tracegate");
    assert_eq!(digest.hex.len(), 64);
    assert!(digest.hex.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    assert_eq!(digest, hash_bytes(DEFAULT_HASH_ALGORITHM, b"tracegate"));
}
