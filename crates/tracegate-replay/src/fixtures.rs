// crates/tracegate-replay/src/fixtures.rs
// ============================================================================
// Module: Fixture Store
// Description: Recorded tool/LLM results keyed by signature or index.
// Purpose: Make replays deterministic by returning captured results.
// Dependencies: serde, serde_json, thiserror, tracegate-core
// ============================================================================

//! ## Overview
//! A fixture bundle captures every tool and LLM result observed during
//! recording. During replay the matcher hands the captured value back for
//! each request, keyed either by a canonical signature hash or by
//! kind-restricted emission order. Signatures are computed over the
//! volatile-stripped, redacted request canon, so they are invariant under
//! request map key order and redactable value changes.
//!
//! A bundle is single-writer during record and single-reader during replay;
//! no concurrent sharing is supported.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracegate_core::CanonicalNormalizer;
use tracegate_core::EventType;
use tracegate_core::FixturePolicy;
use tracegate_core::NORMALIZER_VERSION;
use tracegate_core::TraceEvent;
use tracegate_core::core::spec::LlmMatchMode;
use tracegate_core::core::spec::ReplayOptions;
use tracegate_core::core::spec::ToolMatchMode;
use tracegate_core::hashing::DEFAULT_HASH_ALGORITHM;
use tracegate_core::hashing::hash_canonical_json;

// ============================================================================
// SECTION: Fixture Model
// ============================================================================

/// Fixture kinds.
///
/// # Invariants
/// - Variants are stable for serialization and bundle layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureKind {
    /// LLM completion fixture.
    Llm,
    /// Tool result fixture.
    Tool,
}

impl FixtureKind {
    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for FixtureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded fixture entry.
///
/// # Invariants
/// - `signature` is the canonical hash of the stripped request.
/// - `index` is 1-based within the kind-restricted emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureEntry {
    /// Fixture kind.
    pub kind: FixtureKind,
    /// Tool name or `provider:model` label.
    pub name: String,
    /// Canonical signature of the recorded request.
    pub signature: String,
    /// Kind-restricted emission order (1-based).
    pub index: u64,
    /// Recorded return value.
    pub value: Value,
    /// Recorded error, when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Persisted fixture bundle for one spec.
///
/// # Invariants
/// - `normalizer_version` is the version the signatures were computed under.
/// - Writing is append-only during recording.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FixtureBundle {
    /// Normalizer version at record time.
    #[serde(default = "default_normalizer_version")]
    pub normalizer_version: String,
    /// Recorded entries in emission order.
    #[serde(default)]
    pub entries: Vec<FixtureEntry>,
}

fn default_normalizer_version() -> String {
    NORMALIZER_VERSION.to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fixture lookup and bundle errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling; `Exhausted` carries the
///   request canon digest for diagnosis.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// No fixture matches the replayed request.
    #[error(
        "fixture exhausted for {kind} {name}: signature {expected_signature} \
         (consumed {consumed_count} of {available_count})"
    )]
    Exhausted {
        /// Request kind.
        kind: FixtureKind,
        /// Tool name or LLM label.
        name: String,
        /// Canonical signature of the unmatched request.
        expected_signature: String,
        /// Matching fixtures already consumed.
        consumed_count: u64,
        /// Matching fixtures available in total.
        available_count: u64,
    },
    /// Strict-sequence matching found a fixture out of order.
    #[error("fixture order mismatch for {kind} {name}: expected index {expected}, got {actual}")]
    OrderMismatch {
        /// Request kind.
        kind: FixtureKind,
        /// Tool name or LLM label.
        name: String,
        /// Next-expected kind-restricted index.
        expected: u64,
        /// Index of the signature-matched fixture.
        actual: u64,
    },
    /// Bundle recorded under a different normalizer version.
    #[error("fixture bundle normalizer version {recorded} does not match current {current}")]
    VersionMismatch {
        /// Version recorded in the bundle.
        recorded: String,
        /// Version of the running engine.
        current: String,
    },
    /// Bundle payload is not valid.
    #[error("invalid fixture bundle: {0}")]
    Invalid(String),
    /// Request canonicalization failed.
    #[error("fixture signature failed: {0}")]
    Signature(String),
}

impl FixtureError {
    /// Renders the exhaustion payload attached to violation details.
    #[must_use]
    pub fn detail(&self) -> Value {
        match self {
            Self::Exhausted {
                kind,
                name,
                expected_signature,
                consumed_count,
                available_count,
            } => {
                let context_key =
                    if *kind == FixtureKind::Tool { "tool_name" } else { "llm_signature" };
                json!({
                    "code": "FIXTURE_EXHAUSTED",
                    context_key: name,
                    "expected_signature": expected_signature,
                    "consumed_count": consumed_count,
                    "available_count": available_count,
                })
            }
            other => Value::String(other.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Signatures
// ============================================================================

/// Computes the canonical request signature for a tool call.
///
/// The canon is `(tool_name, canonical(args))` over the stripped, redacted
/// input payload.
///
/// # Errors
///
/// Returns [`FixtureError`] when canonicalization fails.
pub fn tool_signature(
    normalizer: &CanonicalNormalizer,
    tool_name: &str,
    input: &Value,
) -> Result<String, FixtureError> {
    let canon = json!({
        "tool_name": tool_name,
        "input": normalizer.strip(input),
    });
    hash_canonical_json(DEFAULT_HASH_ALGORITHM, &canon)
        .map(|digest| digest.hex)
        .map_err(|error| FixtureError::Signature(error.to_string()))
}

/// Computes the canonical request signature for an LLM call.
///
/// The canon covers provider, model, messages or prompt, and declared
/// parameters, all stripped and redacted.
///
/// # Errors
///
/// Returns [`FixtureError`] when canonicalization fails.
pub fn llm_signature(
    normalizer: &CanonicalNormalizer,
    payload: &Map<String, Value>,
) -> Result<String, FixtureError> {
    let mut canon = Map::new();
    for key in ["provider", "model", "messages", "prompt", "params"] {
        if let Some(value) = payload.get(key) {
            canon.insert(key.to_string(), normalizer.strip(value));
        }
    }
    hash_canonical_json(DEFAULT_HASH_ALGORITHM, &Value::Object(canon))
        .map(|digest| digest.hex)
        .map_err(|error| FixtureError::Signature(error.to_string()))
}

// ============================================================================
// SECTION: Bundle Construction
// ============================================================================

impl FixtureBundle {
    /// Builds a bundle from a recorded trace by pairing calls with results.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError`] when a request cannot be canonicalized.
    pub fn from_events(
        events: &[TraceEvent],
        normalizer: &CanonicalNormalizer,
    ) -> Result<Self, FixtureError> {
        let mut pending_tool: Vec<(String, String)> = Vec::new();
        let mut pending_llm: Vec<(String, String)> = Vec::new();
        let mut entries = Vec::new();
        let mut tool_index = 0_u64;
        let mut llm_index = 0_u64;

        for event in events {
            match event.event_type {
                EventType::ToolCalled => {
                    let name = event.tool_name().unwrap_or("unknown").to_string();
                    let input = event.payload.get("input").cloned().unwrap_or(Value::Null);
                    let signature = tool_signature(normalizer, &name, &input)?;
                    pending_tool.push((name, signature));
                }
                EventType::ToolReturned => {
                    if pending_tool.is_empty() {
                        continue;
                    }
                    let (name, signature) = pending_tool.remove(0);
                    tool_index += 1;
                    entries.push(FixtureEntry {
                        kind: FixtureKind::Tool,
                        name,
                        signature,
                        index: tool_index,
                        value: json!({
                            "output": event.payload.get("output").cloned().unwrap_or(Value::Null),
                            "error": event.payload.get("error").cloned().unwrap_or(Value::Null),
                        }),
                        error: event
                            .payload
                            .get("error")
                            .and_then(Value::as_str)
                            .map(ToString::to_string),
                    });
                }
                EventType::LlmCalled => {
                    let name = event.llm_label().unwrap_or_else(|| "unknown:unknown".to_string());
                    let signature = llm_signature(normalizer, &event.payload)?;
                    pending_llm.push((name, signature));
                }
                EventType::LlmReturned => {
                    if pending_llm.is_empty() {
                        continue;
                    }
                    let (name, signature) = pending_llm.remove(0);
                    llm_index += 1;
                    entries.push(FixtureEntry {
                        kind: FixtureKind::Llm,
                        name,
                        signature,
                        index: llm_index,
                        value: json!({
                            "output": event.payload.get("output").cloned().unwrap_or(Value::Null),
                            "usage": event.payload.get("usage").cloned().unwrap_or(Value::Null),
                            "error": event.payload.get("error").cloned().unwrap_or(Value::Null),
                        }),
                        error: event
                            .payload
                            .get("error")
                            .and_then(Value::as_str)
                            .map(ToString::to_string),
                    });
                }
                EventType::RunStarted
                | EventType::RunFinished
                | EventType::AgentStep => {}
            }
        }

        Ok(Self {
            normalizer_version: NORMALIZER_VERSION.to_string(),
            entries,
        })
    }

    /// Parses a bundle from its serialized form.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError`] when the payload is not a valid bundle.
    pub fn from_value(value: &Value) -> Result<Self, FixtureError> {
        serde_json::from_value(value.clone())
            .map_err(|error| FixtureError::Invalid(error.to_string()))
    }

    /// Serializes the bundle.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError`] when serialization fails.
    pub fn to_value(&self) -> Result<Value, FixtureError> {
        serde_json::to_value(self).map_err(|error| FixtureError::Invalid(error.to_string()))
    }

    /// Verifies the bundle was recorded under the current normalizer.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::VersionMismatch`] on disagreement.
    pub fn check_version(&self) -> Result<(), FixtureError> {
        if self.normalizer_version == NORMALIZER_VERSION {
            Ok(())
        } else {
            Err(FixtureError::VersionMismatch {
                recorded: self.normalizer_version.clone(),
                current: NORMALIZER_VERSION.to_string(),
            })
        }
    }
}

// ============================================================================
// SECTION: Matcher
// ============================================================================

/// Lookup-plus-consume matcher over a fixture bundle.
///
/// # Invariants
/// - Each entry is consumed at most once.
/// - Lookup is deterministic: first unconsumed match in emission order.
#[derive(Debug)]
pub struct FixtureMatcher {
    policy: FixturePolicy,
    strict_sequence: bool,
    llm_mode: LlmMatchMode,
    tool_mode: ToolMatchMode,
    entries: Vec<FixtureEntry>,
    consumed: BTreeSet<usize>,
    /// Next-expected kind-restricted index per kind.
    cursors: BTreeMap<FixtureKind, u64>,
}

impl FixtureMatcher {
    /// Creates a matcher for a bundle under the given replay options.
    #[must_use]
    pub fn new(bundle: FixtureBundle, policy: FixturePolicy, replay: &ReplayOptions) -> Self {
        Self {
            policy,
            strict_sequence: replay.strict_sequence,
            llm_mode: replay.llm_match_mode,
            tool_mode: replay.tool_match_mode,
            entries: bundle.entries,
            consumed: BTreeSet::new(),
            cursors: BTreeMap::new(),
        }
    }

    /// Matches and consumes the fixture for a replayed request.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Exhausted`] when no fixture matches and
    /// [`FixtureError::OrderMismatch`] when strict sequencing is violated.
    pub fn consume(
        &mut self,
        kind: FixtureKind,
        name: &str,
        signature: &str,
    ) -> Result<FixtureEntry, FixtureError> {
        let sequence_only = match kind {
            FixtureKind::Llm => self.llm_mode == LlmMatchMode::SequenceMatch,
            FixtureKind::Tool => self.tool_mode == ToolMatchMode::SequenceMatch,
        };
        if sequence_only {
            return self.consume_next_of_kind(kind, name, signature);
        }
        match self.policy {
            FixturePolicy::ByIndex => self.consume_by_index(kind, name, signature),
            FixturePolicy::ByHash => self.consume_by_signature(kind, name, signature),
        }
    }

    /// Returns the next unconsumed fixture of the kind, ignoring signatures.
    fn consume_next_of_kind(
        &mut self,
        kind: FixtureKind,
        name: &str,
        signature: &str,
    ) -> Result<FixtureEntry, FixtureError> {
        let position = self
            .entries
            .iter()
            .enumerate()
            .find(|(slot, entry)| entry.kind == kind && !self.consumed.contains(slot))
            .map(|(slot, _)| slot);
        match position {
            Some(slot) => {
                self.consumed.insert(slot);
                self.advance_cursor(kind);
                Ok(self.entries[slot].clone())
            }
            None => Err(self.exhausted(kind, name, signature)),
        }
    }

    /// Returns the fixture at the next kind-restricted index.
    fn consume_by_index(
        &mut self,
        kind: FixtureKind,
        name: &str,
        signature: &str,
    ) -> Result<FixtureEntry, FixtureError> {
        let next_index = self.cursors.get(&kind).copied().unwrap_or(0) + 1;
        let position = self
            .entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.kind == kind && entry.index == next_index)
            .map(|(slot, _)| slot);
        match position {
            Some(slot) => {
                let entry = self.entries[slot].clone();
                self.consumed.insert(slot);
                self.advance_cursor(kind);
                if self.strict_sequence && entry.signature != signature {
                    return Err(FixtureError::OrderMismatch {
                        kind,
                        name: name.to_string(),
                        expected: next_index,
                        actual: entry.index,
                    });
                }
                Ok(entry)
            }
            None => Err(self.exhausted(kind, name, signature)),
        }
    }

    /// Returns the first unconsumed fixture with a matching signature.
    fn consume_by_signature(
        &mut self,
        kind: FixtureKind,
        name: &str,
        signature: &str,
    ) -> Result<FixtureEntry, FixtureError> {
        let position = self
            .entries
            .iter()
            .enumerate()
            .find(|(slot, entry)| {
                entry.kind == kind
                    && entry.signature == signature
                    && !self.consumed.contains(slot)
            })
            .map(|(slot, _)| slot);
        match position {
            Some(slot) => {
                let entry = self.entries[slot].clone();
                let expected = self.cursors.get(&kind).copied().unwrap_or(0) + 1;
                if self.strict_sequence && entry.index != expected {
                    return Err(FixtureError::OrderMismatch {
                        kind,
                        name: name.to_string(),
                        expected,
                        actual: entry.index,
                    });
                }
                self.consumed.insert(slot);
                self.advance_cursor(kind);
                Ok(entry)
            }
            None => Err(self.exhausted(kind, name, signature)),
        }
    }

    fn advance_cursor(&mut self, kind: FixtureKind) {
        *self.cursors.entry(kind).or_insert(0) += 1;
    }

    fn exhausted(&self, kind: FixtureKind, name: &str, signature: &str) -> FixtureError {
        let matching: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.kind == kind && entry.signature == signature)
            .map(|(slot, _)| slot)
            .collect();
        let consumed_count =
            matching.iter().filter(|slot| self.consumed.contains(*slot)).count() as u64;
        FixtureError::Exhausted {
            kind,
            name: name.to_string(),
            expected_signature: signature.to_string(),
            consumed_count,
            available_count: matching.len() as u64,
        }
    }
}
