// crates/tracegate-core/src/core/events.rs
// ============================================================================
// Module: Trace Event Model
// Description: Canonical trace events, normalized views, and trace validation.
// Purpose: Define the single data model shared by every pipeline component.
// Dependencies: serde, serde_json, thiserror, crate::core::{canonical, hashing, identifiers}
// ============================================================================

//! ## Overview
//! A trace is a finite, append-only sequence of events emitted by one agent
//! run. Events are immutable once emitted; processing wraps them in a
//! normalized view carrying an abstract kind and a stable content hash. All
//! shape checks happen here so downstream components can assume well-formed
//! input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::canonical::CanonicalNormalizer;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Wire schema version accepted by this engine.
pub const SCHEMA_VERSION: &str = "v1";

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Trace event types in the `v1` wire schema.
///
/// # Invariants
/// - Variants are stable for serialization and fixture matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Run lifecycle start marker.
    RunStarted,
    /// Agent-internal step annotation.
    AgentStep,
    /// Outbound LLM request.
    LlmCalled,
    /// LLM response.
    LlmReturned,
    /// Outbound tool invocation.
    ToolCalled,
    /// Tool result.
    ToolReturned,
    /// Run lifecycle end marker.
    RunFinished,
}

impl EventType {
    /// Returns the stable wire label for the event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::AgentStep => "agent_step",
            Self::LlmCalled => "llm_called",
            Self::LlmReturned => "llm_returned",
            Self::ToolCalled => "tool_called",
            Self::ToolReturned => "tool_returned",
            Self::RunFinished => "run_finished",
        }
    }
}

/// Abstract event kinds carried by the normalized view.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Tool invocation.
    ToolCall,
    /// Tool result.
    ToolResult,
    /// LLM request.
    LlmRequest,
    /// LLM response.
    LlmResponse,
    /// Agent step or message.
    Message,
    /// Lifecycle observation.
    Observation,
    /// Errored result.
    Error,
}

impl EventKind {
    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToolCall => "TOOL_CALL",
            Self::ToolResult => "TOOL_RESULT",
            Self::LlmRequest => "LLM_REQUEST",
            Self::LlmResponse => "LLM_RESPONSE",
            Self::Message => "MESSAGE",
            Self::Observation => "OBSERVATION",
            Self::Error => "ERROR",
        }
    }
}

// ============================================================================
// SECTION: Trace Event
// ============================================================================

/// Immutable trace event in the `v1` wire schema.
///
/// # Invariants
/// - `seq` is positive and strictly increasing per run.
/// - Events are appended to the JSONL trace exactly once and never mutated.
/// - `event_id` may be empty in raw emission; it is always populated in
///   persisted and normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Wire schema version; absent input defaults to `v1`.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Event type.
    pub event_type: EventType,
    /// Emission-order sequence number (1-based).
    pub seq: u64,
    /// Opaque run identifier.
    pub run_id: RunId,
    /// Relative milliseconds since `run_started`.
    pub rel_ms: u64,
    /// Event-type-specific payload.
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Opaque metadata; not interpreted unless referenced by policy.
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// Content hash computed after canonicalization.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_id: String,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl TraceEvent {
    /// Returns the tool name for tool events.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        match self.event_type {
            EventType::ToolCalled | EventType::ToolReturned => {
                self.payload.get("tool_name").and_then(Value::as_str)
            }
            _ => None,
        }
    }

    /// Returns the `provider:model` label for LLM events.
    #[must_use]
    pub fn llm_label(&self) -> Option<String> {
        match self.event_type {
            EventType::LlmCalled | EventType::LlmReturned => {
                let provider = self.payload.get("provider").and_then(Value::as_str)?;
                let model = self.payload.get("model").and_then(Value::as_str)?;
                Some(format!("{provider}:{model}"))
            }
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Normalized View
// ============================================================================

/// Normalized event view used by abstraction and contracts.
///
/// # Invariants
/// - `payload` is the redaction-and-strip-normalized payload.
/// - `stable_hash` is invariant under volatile fields and map key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Sequence number of the underlying event.
    pub seq: u64,
    /// Relative milliseconds since `run_started` (excluded from hashing).
    pub rel_ms: u64,
    /// Concrete wire event type.
    pub event_type: EventType,
    /// Abstract kind token.
    pub kind: EventKind,
    /// Display name: tool name, `provider:model`, or step name.
    pub name: String,
    /// Normalized payload.
    pub payload: Value,
    /// Content hash of the normalized event.
    pub stable_hash: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Trace shape and parsing errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling and map 1:1 onto
///   TOOLING violation codes via [`TraceError::violation_code`].
#[derive(Debug, Error)]
pub enum TraceError {
    /// Event failed structural validation.
    #[error("invalid event shape at seq {seq}: {message}")]
    InvalidEventShape {
        /// Sequence number of the offending event (0 when unknown).
        seq: u64,
        /// Shape failure description.
        message: String,
    },
    /// Event declared an unsupported schema version.
    #[error("unsupported schema version '{found}' at seq {seq}")]
    SchemaVersionUnsupported {
        /// Sequence number of the offending event.
        seq: u64,
        /// Declared schema version.
        found: String,
    },
    /// Canonicalization failed while hashing an event.
    #[error("event canonicalization failed at seq {seq}: {message}")]
    Canonicalization {
        /// Sequence number of the offending event.
        seq: u64,
        /// Failure description.
        message: String,
    },
}

impl TraceError {
    /// Returns the stable violation code for this error.
    #[must_use]
    pub const fn violation_code(&self) -> &'static str {
        match self {
            Self::InvalidEventShape { .. } | Self::Canonicalization { .. } => "INVALID_EVENT_SHAPE",
            Self::SchemaVersionUnsupported { .. } => "SCHEMA_VERSION_UNSUPPORTED",
        }
    }

    /// Returns the event index where the error became observable.
    #[must_use]
    pub const fn event_index(&self) -> u64 {
        match self {
            Self::InvalidEventShape { seq, .. }
            | Self::SchemaVersionUnsupported { seq, .. }
            | Self::Canonicalization { seq, .. } => *seq,
        }
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Required payload keys per event type.
const fn required_payload_keys(event_type: EventType) -> &'static [&'static str] {
    match event_type {
        EventType::RunStarted => &["spec_name"],
        EventType::AgentStep => &["name"],
        EventType::LlmCalled | EventType::LlmReturned => &["provider", "model"],
        EventType::ToolCalled => &["tool_name", "input"],
        EventType::ToolReturned => &["tool_name"],
        EventType::RunFinished => &["status"],
    }
}

/// Validates a single event's envelope and payload shape.
///
/// # Errors
///
/// Returns [`TraceError`] when the schema version is unsupported, `seq` is
/// not positive, or required payload fields are absent.
pub fn validate_event(event: &TraceEvent) -> Result<(), TraceError> {
    if event.schema_version != SCHEMA_VERSION {
        return Err(TraceError::SchemaVersionUnsupported {
            seq: event.seq,
            found: event.schema_version.clone(),
        });
    }
    if event.seq == 0 {
        return Err(TraceError::InvalidEventShape {
            seq: 0,
            message: "seq must be a positive integer".to_string(),
        });
    }
    for key in required_payload_keys(event.event_type) {
        if !event.payload.contains_key(*key) {
            return Err(TraceError::InvalidEventShape {
                seq: event.seq,
                message: format!(
                    "{} payload missing required field: {key}",
                    event.event_type.as_str()
                ),
            });
        }
    }
    if event.event_type == EventType::LlmCalled
        && !event.payload.contains_key("messages")
        && !event.payload.contains_key("prompt")
    {
        return Err(TraceError::InvalidEventShape {
            seq: event.seq,
            message: "llm_called payload requires messages or prompt".to_string(),
        });
    }
    Ok(())
}

/// Validates whole-trace invariants: strictly increasing `seq` starting at 1,
/// `run_started` first, `run_finished` last.
///
/// # Errors
///
/// Returns [`TraceError`] for the earliest offending event.
pub fn validate_trace(events: &[TraceEvent]) -> Result<(), TraceError> {
    let Some(first) = events.first() else {
        return Err(TraceError::InvalidEventShape {
            seq: 0,
            message: "trace is empty".to_string(),
        });
    };
    if first.event_type != EventType::RunStarted {
        return Err(TraceError::InvalidEventShape {
            seq: first.seq,
            message: "trace must begin with run_started".to_string(),
        });
    }
    if first.seq != 1 {
        return Err(TraceError::InvalidEventShape {
            seq: first.seq,
            message: "trace seq must start at 1".to_string(),
        });
    }
    let Some(last) = events.last() else {
        return Err(TraceError::InvalidEventShape {
            seq: 0,
            message: "trace is empty".to_string(),
        });
    };
    if last.event_type != EventType::RunFinished {
        return Err(TraceError::InvalidEventShape {
            seq: last.seq,
            message: "trace must end with run_finished".to_string(),
        });
    }
    let mut previous_seq = 0_u64;
    for event in events {
        validate_event(event)?;
        if event.seq <= previous_seq {
            return Err(TraceError::InvalidEventShape {
                seq: event.seq,
                message: format!("seq {} does not increase past {previous_seq}", event.seq),
            });
        }
        previous_seq = event.seq;
    }
    Ok(())
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Builds the hashing envelope for an event: the full record without its
/// `event_id`, ready for volatile stripping.
fn hashing_envelope(event: &TraceEvent) -> Value {
    let mut envelope = Map::new();
    envelope.insert("schema_version".to_string(), Value::String(event.schema_version.clone()));
    envelope
        .insert("event_type".to_string(), Value::String(event.event_type.as_str().to_string()));
    envelope.insert("seq".to_string(), Value::from(event.seq));
    envelope.insert("run_id".to_string(), Value::String(event.run_id.as_str().to_string()));
    envelope.insert("rel_ms".to_string(), Value::from(event.rel_ms));
    envelope.insert("payload".to_string(), Value::Object(event.payload.clone()));
    envelope.insert("meta".to_string(), Value::Object(event.meta.clone()));
    Value::Object(envelope)
}

/// Computes the content hash of an event after canonicalization.
///
/// The hash covers the volatile-stripped, redacted envelope; two events with
/// identical semantic content always produce the same id regardless of map
/// key insertion order.
///
/// # Errors
///
/// Returns [`TraceError`] when canonicalization fails.
pub fn compute_event_id(
    event: &TraceEvent,
    normalizer: &CanonicalNormalizer,
) -> Result<String, TraceError> {
    let stripped = normalizer.strip(&hashing_envelope(event));
    hash_canonical_json(DEFAULT_HASH_ALGORITHM, &stripped)
        .map(|digest| digest.hex)
        .map_err(|error| TraceError::Canonicalization {
            seq: event.seq,
            message: error.to_string(),
        })
}

/// Maps an event to its abstract kind.
fn event_kind(event: &TraceEvent) -> EventKind {
    match event.event_type {
        EventType::ToolCalled => EventKind::ToolCall,
        EventType::ToolReturned => {
            if has_error(&event.payload) {
                EventKind::Error
            } else {
                EventKind::ToolResult
            }
        }
        EventType::LlmCalled => EventKind::LlmRequest,
        EventType::LlmReturned => {
            if has_error(&event.payload) {
                EventKind::Error
            } else {
                EventKind::LlmResponse
            }
        }
        EventType::AgentStep => EventKind::Message,
        EventType::RunStarted | EventType::RunFinished => EventKind::Observation,
    }
}

/// Reports whether a payload carries a non-null `error` field.
fn has_error(payload: &Map<String, Value>) -> bool {
    payload.get("error").is_some_and(|value| !value.is_null())
}

/// Returns the display name for an event.
fn event_name(event: &TraceEvent) -> String {
    if let Some(tool_name) = event.tool_name() {
        return tool_name.to_string();
    }
    if let Some(label) = event.llm_label() {
        return label;
    }
    if event.event_type == EventType::AgentStep
        && let Some(name) = event.payload.get("name").and_then(Value::as_str)
    {
        return name.to_string();
    }
    event.event_type.as_str().to_string()
}

/// Normalizes a single event: validation, stripping, redaction, hashing.
///
/// # Errors
///
/// Returns [`TraceError`] when validation or canonicalization fails.
pub fn normalize_event(
    event: &TraceEvent,
    normalizer: &CanonicalNormalizer,
) -> Result<NormalizedEvent, TraceError> {
    validate_event(event)?;
    let payload = normalizer.strip(&Value::Object(event.payload.clone()));
    let stable_hash = compute_event_id(event, normalizer)?;
    Ok(NormalizedEvent {
        seq: event.seq,
        rel_ms: event.rel_ms,
        event_type: event.event_type,
        kind: event_kind(event),
        name: normalizer.redact_text(&event_name(event)),
        payload,
        stable_hash,
    })
}

/// Normalizes a whole trace, preserving emission order.
///
/// # Errors
///
/// Returns [`TraceError`] for the earliest event that fails validation.
pub fn normalize_trace(
    events: &[TraceEvent],
    normalizer: &CanonicalNormalizer,
) -> Result<Vec<NormalizedEvent>, TraceError> {
    validate_trace(events)?;
    let mut normalized = Vec::with_capacity(events.len());
    for event in events {
        normalized.push(normalize_event(event, normalizer)?);
    }
    Ok(normalized)
}

// ============================================================================
// SECTION: JSONL Codec
// ============================================================================

/// Parses a JSONL document into trace events.
///
/// Blank lines are skipped. Events missing an `event_id` receive one computed
/// with the supplied normalizer.
///
/// # Errors
///
/// Returns [`TraceError`] when a line is not a valid event object.
pub fn parse_jsonl(
    text: &str,
    normalizer: &CanonicalNormalizer,
) -> Result<Vec<TraceEvent>, TraceError> {
    let mut events = Vec::new();
    for (line_number, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut event: TraceEvent =
            serde_json::from_str(trimmed).map_err(|error| TraceError::InvalidEventShape {
                seq: u64::try_from(line_number + 1).unwrap_or(u64::MAX),
                message: format!("line {} is not a valid event: {error}", line_number + 1),
            })?;
        if event.event_id.is_empty() {
            event.event_id = compute_event_id(&event, normalizer)?;
        }
        events.push(event);
    }
    Ok(events)
}

/// Renders trace events as a canonical JSONL document.
///
/// # Errors
///
/// Returns [`TraceError`] when an event cannot be canonicalized.
pub fn render_jsonl(events: &[TraceEvent]) -> Result<String, TraceError> {
    let mut out = String::new();
    for event in events {
        let bytes = crate::core::hashing::canonical_json_bytes(event).map_err(|error| {
            TraceError::Canonicalization {
                seq: event.seq,
                message: error.to_string(),
            }
        })?;
        out.push_str(&String::from_utf8_lossy(&bytes));
        out.push('\n');
    }
    Ok(out)
}
