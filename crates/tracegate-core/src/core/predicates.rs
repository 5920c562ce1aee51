// crates/tracegate-core/src/core/predicates.rs
// ============================================================================
// Module: Payload Predicates
// Description: PII, domain, and numeric detectors over normalized payloads.
// Purpose: Provide the deterministic detector set used by abstraction and contracts.
// Dependencies: regex, serde_json, url
// ============================================================================

//! ## Overview
//! Detectors walk normalized payload values and report matches over string
//! content. They run strictly after volatile stripping and redaction, so a
//! redacted substring can never trigger a detector. All outputs use sorted
//! collections.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use url::Url;

// ============================================================================
// SECTION: Detector Patterns
// ============================================================================

/// Email address detector.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used, reason = "Pattern is a compile-time constant.")]
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email pattern")
});

/// North-American phone number detector.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used, reason = "Pattern is a compile-time constant.")]
    Regex::new(r"\b(?:\+?1[-.\s]?)?(?:\(?\d{3}\)?[-.\s]?)?\d{3}[-.\s]?\d{4}\b")
        .expect("phone pattern")
});

/// HTTP/HTTPS URL detector.
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used, reason = "Pattern is a compile-time constant.")]
    Regex::new(r"https?://[^\s)]+").expect("url pattern")
});

// ============================================================================
// SECTION: String Walking
// ============================================================================

/// Invokes `visit` for every string reachable in the value.
fn walk_strings<'a>(value: &'a Value, visit: &mut impl FnMut(&'a str)) {
    match value {
        Value::String(text) => visit(text),
        Value::Object(map) => {
            for entry in map.values() {
                walk_strings(entry, visit);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_strings(item, visit);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

// ============================================================================
// SECTION: Detectors
// ============================================================================

/// Reports whether the value contains an email address.
#[must_use]
pub fn contains_email(value: &Value) -> bool {
    let mut found = false;
    walk_strings(value, &mut |text| {
        if !found && EMAIL_RE.is_match(text) {
            found = true;
        }
    });
    found
}

/// Reports whether the value contains a phone number.
#[must_use]
pub fn contains_phone(value: &Value) -> bool {
    let mut found = false;
    walk_strings(value, &mut |text| {
        if !found && PHONE_RE.is_match(text) {
            found = true;
        }
    });
    found
}

/// Extracts lowercase hostnames from every URL reachable in the value.
#[must_use]
pub fn extract_domains(value: &Value) -> BTreeSet<String> {
    let mut domains = BTreeSet::new();
    walk_strings(value, &mut |text| {
        for candidate in URL_RE.find_iter(text) {
            if let Ok(url) = Url::parse(candidate.as_str())
                && let Some(host) = url.host_str()
            {
                domains.insert(host.to_ascii_lowercase());
            }
        }
        // A full-string URL may omit the scheme-and-path shape the matcher
        // expects (e.g. "https://example.com" alone parses directly too).
        if let Ok(url) = Url::parse(text)
            && let Some(host) = url.host_str()
        {
            domains.insert(host.to_ascii_lowercase());
        }
    });
    domains
}

/// Extracts every numeric value reachable in the value.
#[must_use]
pub fn extract_numeric_values(value: &Value) -> Vec<f64> {
    let mut numbers = Vec::new();
    collect_numbers(value, &mut numbers);
    numbers
}

fn collect_numbers(value: &Value, out: &mut Vec<f64>) {
    match value {
        Value::Number(number) => {
            if let Some(float) = number.as_f64() {
                out.push(float);
            }
        }
        Value::Object(map) => {
            for entry in map.values() {
                collect_numbers(entry, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_numbers(item, out);
            }
        }
        Value::Null | Value::Bool(_) | Value::String(_) => {}
    }
}
