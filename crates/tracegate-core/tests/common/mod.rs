// crates/tracegate-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Helpers
// Description: Trace and spec builders shared by integration tests.
// ============================================================================

//! Builders for well-formed traces and resolved specs.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only helpers; not every test uses every builder."
)]

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tracegate_core::EventType;
use tracegate_core::ResolvedSpec;
use tracegate_core::RunId;
use tracegate_core::SCHEMA_VERSION;
use tracegate_core::TraceEvent;

/// Builds an event with the given type, seq, and payload.
pub fn event(event_type: EventType, seq: u64, payload: Value) -> TraceEvent {
    let Value::Object(payload) = payload else {
        panic!("payload must be an object");
    };
    TraceEvent {
        schema_version: SCHEMA_VERSION.to_string(),
        event_type,
        seq,
        run_id: RunId::new("run-test"),
        rel_ms: seq * 10,
        payload,
        meta: Map::new(),
        event_id: String::new(),
    }
}

/// Builds a `run_started` event.
pub fn run_started(seq: u64) -> TraceEvent {
    event(EventType::RunStarted, seq, json!({"spec_name": "test-spec"}))
}

/// Builds a `run_finished` event.
pub fn run_finished(seq: u64) -> TraceEvent {
    event(EventType::RunFinished, seq, json!({"status": "ok"}))
}

/// Builds a `tool_called` event with empty kwargs.
pub fn tool_called(seq: u64, tool_name: &str) -> TraceEvent {
    tool_called_with(seq, tool_name, json!({}))
}

/// Builds a `tool_called` event with explicit kwargs.
pub fn tool_called_with(seq: u64, tool_name: &str, kwargs: Value) -> TraceEvent {
    event(
        EventType::ToolCalled,
        seq,
        json!({
            "tool_name": tool_name,
            "input": {"args": [], "kwargs": kwargs},
        }),
    )
}

/// Builds a `tool_returned` event.
pub fn tool_returned(seq: u64, tool_name: &str) -> TraceEvent {
    event(
        EventType::ToolReturned,
        seq,
        json!({"tool_name": tool_name, "output": "ok"}),
    )
}

/// Builds an `llm_called` event.
pub fn llm_called(seq: u64, prompt: &str) -> TraceEvent {
    event(
        EventType::LlmCalled,
        seq,
        json!({
            "provider": "openai",
            "model": "gpt-4o-mini",
            "prompt": prompt,
        }),
    )
}

/// Builds an `llm_returned` event with usage metadata.
pub fn llm_returned(seq: u64, output: &str, prompt_tokens: u64, completion_tokens: u64) -> TraceEvent {
    event(
        EventType::LlmReturned,
        seq,
        json!({
            "provider": "openai",
            "model": "gpt-4o-mini",
            "output": output,
            "usage": {
                "prompt_tokens": prompt_tokens,
                "completion_tokens": completion_tokens,
            },
        }),
    )
}

/// Wraps interior events with `run_started`/`run_finished`, renumbering seq.
pub fn trace(interior: Vec<TraceEvent>) -> Vec<TraceEvent> {
    let mut events = Vec::with_capacity(interior.len() + 2);
    events.push(run_started(1));
    events.extend(interior);
    let mut seq = 1;
    for event in &mut events {
        event.seq = seq;
        seq += 1;
    }
    events.push(run_finished(seq));
    events
}

/// Builds a trace whose interior is a plain call/return pair per tool name.
pub fn call_trace(tool_names: &[&str]) -> Vec<TraceEvent> {
    let mut interior = Vec::new();
    for name in tool_names {
        interior.push(tool_called(0, name));
        interior.push(tool_returned(0, name));
    }
    trace(interior)
}

/// Resolves a spec from a JSON object, panicking on failure.
pub fn spec_from(value: Value) -> ResolvedSpec {
    let (spec, _warnings) = ResolvedSpec::from_value(&value).expect("spec resolves");
    spec
}

/// A minimal spec with the given contract and refinement overrides.
pub fn base_spec() -> Value {
    json!({
        "name": "test-spec",
        "command": "true",
    })
}
