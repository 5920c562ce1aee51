// crates/tracegate-core/src/core/abstraction.rs
// ============================================================================
// Module: Abstraction Pipeline
// Description: Deterministic map from a normalized trace to tokens, skeleton,
// and predicates.
// Purpose: Produce the abstract representation consumed by refinement and reports.
// Dependencies: serde, serde_json, crate::core::{events, identifiers, predicates}
// ============================================================================

//! ## Overview
//! The abstraction is a pure function over the normalized trace: a single
//! index-ordered pass maps each event to a token, extracts the call skeleton
//! (tool names minus ignored tools), and aggregates the predicate bag. Output
//! collections iterate in sorted order; the function performs no I/O and
//! reads no clocks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::events::EventKind;
use crate::core::events::NormalizedEvent;
use crate::core::identifiers::ToolName;
use crate::core::predicates::contains_email;
use crate::core::predicates::contains_phone;
use crate::core::predicates::extract_domains;
use crate::core::predicates::extract_numeric_values;

// ============================================================================
// SECTION: Tokens
// ============================================================================

/// Abstract token kinds.
///
/// # Invariants
/// - Variants are stable for serialization and debugging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    /// Tool invocation token.
    Call,
    /// Tool result token.
    Result,
    /// LLM request token.
    LlmRequest,
    /// LLM response token.
    LlmResponse,
    /// Agent step token.
    Message,
    /// Lifecycle observation token.
    Observation,
    /// Errored result token.
    Error,
}

/// One abstract token with its source event index.
///
/// # Invariants
/// - `event_index` is the `seq` of the source event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Source event `seq`.
    pub event_index: u64,
    /// Token kind.
    pub kind: TokenKind,
    /// Token name: tool name, `provider:model`, or step name.
    pub name: String,
}

/// One skeleton step: a surviving tool call.
///
/// # Invariants
/// - `event_index` is the `seq` of the `tool_called` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkeletonStep {
    /// Source event `seq`.
    pub event_index: u64,
    /// Tool name.
    pub tool_name: ToolName,
}

// ============================================================================
// SECTION: Predicates
// ============================================================================

/// PII detector flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PiiFlags {
    /// An email address was observed in an outbound payload.
    pub email: bool,
    /// A phone number was observed in an outbound payload.
    pub phone: bool,
}

/// Aggregated predicate bag over a trace.
///
/// # Invariants
/// - Derived from the redaction-and-strip-normalized trace, so values are
///   invariant under volatile fields.
/// - Maps and sets iterate in sorted order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Predicates {
    /// Total surviving tool calls.
    pub tool_calls_total: u64,
    /// Tool call counts by name, sorted.
    pub tool_calls_by_name: BTreeMap<ToolName, u64>,
    /// Sorted set of outbound domains.
    pub domains: BTreeSet<String>,
    /// PII detector flags.
    pub pii: PiiFlags,
    /// Maximum numeric value observed across payloads.
    pub max_numeric_value: Option<f64>,
    /// Calls to tools whose name matches the refund pattern.
    pub refund_count: u64,
}

// ============================================================================
// SECTION: Abstract Trace
// ============================================================================

/// Abstraction output: tokens, skeleton, and predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractTrace {
    /// Token stream in emission order.
    pub tokens: Vec<Token>,
    /// Call skeleton in emission order.
    pub skeleton: Vec<SkeletonStep>,
    /// Aggregated predicates.
    pub predicates: Predicates,
}

/// Abstraction configuration.
///
/// # Invariants
/// - `ignore_call_tools` strips matching calls from tokens and skeleton.
#[derive(Debug, Clone, Default)]
pub struct AbstractionOptions {
    /// Tool names removed before skeleton extraction.
    pub ignore_call_tools: BTreeSet<ToolName>,
}

// ============================================================================
// SECTION: Abstraction Function
// ============================================================================

/// Maps a normalized event to its token kind.
const fn token_kind(kind: EventKind) -> TokenKind {
    match kind {
        EventKind::ToolCall => TokenKind::Call,
        EventKind::ToolResult => TokenKind::Result,
        EventKind::LlmRequest => TokenKind::LlmRequest,
        EventKind::LlmResponse => TokenKind::LlmResponse,
        EventKind::Message => TokenKind::Message,
        EventKind::Observation => TokenKind::Observation,
        EventKind::Error => TokenKind::Error,
    }
}

/// Builds the abstract trace for a normalized event sequence.
///
/// Pure and deterministic: one index-ordered pass, sorted aggregation, no
/// I/O, no randomness, no time reads.
#[must_use]
pub fn abstract_trace(events: &[NormalizedEvent], options: &AbstractionOptions) -> AbstractTrace {
    let mut tokens = Vec::with_capacity(events.len());
    let mut skeleton = Vec::new();
    let mut tool_counts: BTreeMap<ToolName, u64> = BTreeMap::new();
    let mut domains: BTreeSet<String> = BTreeSet::new();
    let mut max_numeric: Option<f64> = None;
    let mut pii = PiiFlags::default();
    let mut refund_count = 0_u64;

    for event in events {
        if event.kind == EventKind::ToolCall
            && options.ignore_call_tools.contains(event.name.as_str())
        {
            continue;
        }
        tokens.push(Token {
            event_index: event.seq,
            kind: token_kind(event.kind),
            name: event.name.clone(),
        });

        if event.kind == EventKind::ToolCall {
            let tool_name = ToolName::new(event.name.clone());
            skeleton.push(SkeletonStep {
                event_index: event.seq,
                tool_name: tool_name.clone(),
            });
            *tool_counts.entry(tool_name).or_insert(0) += 1;
            if event.name.to_ascii_lowercase().contains("refund") {
                refund_count += 1;
            }
        }

        domains.extend(extract_domains(&event.payload));
        for number in extract_numeric_values(&event.payload) {
            max_numeric = Some(max_numeric.map_or(number, |current| current.max(number)));
        }
        if matches!(event.kind, EventKind::ToolCall | EventKind::LlmRequest) {
            pii.email = pii.email || contains_email(&event.payload);
            pii.phone = pii.phone || contains_phone(&event.payload);
        }
    }

    let tool_calls_total = tool_counts.values().sum();
    AbstractTrace {
        tokens,
        skeleton,
        predicates: Predicates {
            tool_calls_total,
            tool_calls_by_name: tool_counts,
            domains,
            pii,
            max_numeric_value: max_numeric,
            refund_count,
        },
    }
}
