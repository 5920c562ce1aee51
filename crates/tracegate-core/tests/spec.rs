// crates/tracegate-core/tests/spec.rs
// ============================================================================
// Module: Spec Resolution Tests
// Description: Resolved-spec parsing, defaults, and cross-field validation.
// ============================================================================
//! ## Overview
//! Verifies recognized-option defaults, unknown-key handling at both levels,
//! and the cross-field validation rules applied at resolve time.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use serde_json::json;
use tracegate_core::FixturePolicy;
use tracegate_core::RefinementMode;
use tracegate_core::ReplayMode;
use tracegate_core::ResolvedSpec;
use tracegate_core::SpecError;
use tracegate_core::core::spec::DEFAULT_TIMEOUT_SECONDS;
use tracegate_core::core::spec::SIDE_EFFECT_TOOL_REGISTRY_V1;

#[test]
fn minimal_spec_gets_documented_defaults() {
    let (spec, warnings) = ResolvedSpec::from_value(&json!({
        "name": "minimal",
        "command": "python agent.py",
    }))
    .expect("resolve");

    assert!(warnings.is_empty());
    assert_eq!(spec.fixture_policy, FixturePolicy::ByHash);
    assert_eq!(spec.replay.mode, ReplayMode::Offline);
    assert!(!spec.replay.strict_sequence);
    assert_eq!(spec.refinement.mode, RefinementMode::Skeleton);
    assert!(spec.refinement.allow_extra_llm_steps);
    assert!(!spec.refinement.allow_new_tool_names);
    assert_eq!(spec.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    for name in SIDE_EFFECT_TOOL_REGISTRY_V1 {
        assert!(spec.side_effect_tools.contains(*name), "missing {name}");
    }
}

#[test]
fn unknown_top_level_keys_become_warnings() {
    let (_spec, warnings) = ResolvedSpec::from_value(&json!({
        "name": "warned",
        "command": "true",
        "grading": {"model": "gpt"},
    }))
    .expect("resolve");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("grading"));
}

#[test]
fn unknown_keys_inside_recognized_sections_are_rejected() {
    let err = ResolvedSpec::from_value(&json!({
        "name": "bad",
        "command": "true",
        "replay": {"mode": "offline", "retries": 3},
    }))
    .unwrap_err();
    assert!(matches!(err, SpecError::Section(_)));
}

#[test]
fn empty_command_is_rejected() {
    let err = ResolvedSpec::from_value(&json!({
        "name": "bad",
        "command": "   ",
    }))
    .unwrap_err();
    assert!(matches!(err, SpecError::Invalid(_)));
}

#[test]
fn allow_deny_overlap_is_rejected() {
    let err = ResolvedSpec::from_value(&json!({
        "name": "bad",
        "command": "true",
        "contracts": {"tools": {"allow": ["fetch"], "deny": ["fetch"]}},
    }))
    .unwrap_err();
    assert!(matches!(err, SpecError::ToolPolicyOverlap { .. }));
}

#[test]
fn outbound_kinds_are_restricted_to_request_kinds() {
    let err = ResolvedSpec::from_value(&json!({
        "name": "bad",
        "command": "true",
        "contracts": {"data_leak": {
            "deny_pii_outbound": true,
            "outbound_kinds": ["TOOL_RESULT"],
        }},
    }))
    .unwrap_err();
    assert!(matches!(err, SpecError::InvalidOutboundKind { .. }));
}

#[test]
fn invalid_arg_regex_is_rejected() {
    let err = ResolvedSpec::from_value(&json!({
        "name": "bad",
        "command": "true",
        "contracts": {"args": {"fetch": {"fields": {"id": {"regex": "("}}}}},
    }))
    .unwrap_err();
    assert!(matches!(err, SpecError::InvalidArgRegex { .. }));
}

#[test]
fn invalid_redact_pattern_is_rejected() {
    let err = ResolvedSpec::from_value(&json!({
        "name": "bad",
        "command": "true",
        "redact": ["["],
    }))
    .unwrap_err();
    assert!(matches!(err, SpecError::Redact(_)));
}

#[test]
fn network_allowlist_synonym_is_accepted() {
    let (spec, _warnings) = ResolvedSpec::from_value(&json!({
        "name": "net",
        "command": "true",
        "contracts": {"network": {"default": "deny", "allowlist": ["api.approved.io"]}},
    }))
    .expect("resolve");
    assert!(spec.contracts.network.allow_domains.contains("api.approved.io"));
}

#[test]
fn schema_version_is_opaque_metadata() {
    for version in ["0.3", "0.4", "banana"] {
        let (spec, _warnings) = ResolvedSpec::from_value(&json!({
            "name": "versioned",
            "command": "true",
            "schema_version": version,
        }))
        .expect("resolve");
        assert_eq!(spec.schema_version.as_deref(), Some(version));
    }
}

#[test]
fn outbound_kinds_default_to_both_request_kinds() {
    let (spec, _warnings) = ResolvedSpec::from_value(&json!({
        "name": "leaky",
        "command": "true",
        "contracts": {"data_leak": {"deny_pii_outbound": true}},
    }))
    .expect("resolve");
    let kinds = spec.outbound_kinds();
    assert_eq!(kinds.len(), 2);
}
