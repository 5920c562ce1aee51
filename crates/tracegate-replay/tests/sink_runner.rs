// crates/tracegate-replay/tests/sink_runner.rs
// ============================================================================
// Module: Sink and Runner Tests
// Description: Ordered emission, command parsing, and endpoint synthesis.
// ============================================================================
//! ## Overview
//! Verifies that the sink assigns strictly increasing sequence numbers and
//! produces a parseable trace, that command splitting honors quotes, and
//! that the runner synthesizes lifecycle endpoints for silent agents.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tracegate_core::CanonicalNormalizer;
use tracegate_core::EventType;
use tracegate_core::ResolvedSpec;
use tracegate_core::RunId;
use tracegate_replay::EmitSink;
use tracegate_replay::ReplayGuard;
use tracegate_replay::RunMode;
use tracegate_replay::RunnerConfig;
use tracegate_replay::execute_spec;
use tracegate_replay::read_trace_file;
use tracegate_replay::split_command;

fn payload(value: Value) -> Map<String, Value> {
    let Value::Object(map) = value else {
        panic!("payload must be an object");
    };
    map
}

#[test]
fn sink_assigns_strictly_increasing_seq() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("trace.jsonl");
    let sink = EmitSink::create(&path, RunId::new("run-1")).expect("sink");

    let first = sink
        .emit(EventType::RunStarted, payload(json!({"spec_name": "s"})), Map::new())
        .expect("emit run_started");
    let second = sink
        .emit(
            EventType::ToolCalled,
            payload(json!({"tool_name": "fetch", "input": {"args": [], "kwargs": {}}})),
            Map::new(),
        )
        .expect("emit tool_called");
    let third = sink
        .emit(EventType::RunFinished, payload(json!({"status": "ok"})), Map::new())
        .expect("emit run_finished");
    assert_eq!((first, second, third), (1, 2, 3));

    let normalizer = CanonicalNormalizer::without_redaction();
    let events = read_trace_file(&path, &normalizer).expect("read back");
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].event_type, EventType::RunStarted);
    assert_eq!(events[2].event_type, EventType::RunFinished);
    assert!(events.iter().all(|event| !event.event_id.is_empty()));
}

#[test]
fn sink_emissions_are_usable_across_threads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("trace.jsonl");
    let sink = std::sync::Arc::new(EmitSink::create(&path, RunId::new("run-1")).expect("sink"));

    let mut handles = Vec::new();
    for _ in 0 .. 4 {
        let sink = std::sync::Arc::clone(&sink);
        handles.push(std::thread::spawn(move || {
            for _ in 0 .. 8 {
                sink.emit(
                    EventType::AgentStep,
                    payload(json!({"name": "step"})),
                    Map::new(),
                )
                .expect("emit");
            }
        }));
    }
    for handle in handles {
        handle.join().expect("join");
    }

    let normalizer = CanonicalNormalizer::without_redaction();
    let events = read_trace_file(&path, &normalizer).expect("read back");
    assert_eq!(events.len(), 32);
    let mut seqs: Vec<u64> = events.iter().map(|event| event.seq).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (1 ..= 32).collect::<Vec<u64>>());
}

#[test]
fn split_command_honors_quotes() {
    let words = split_command("sh -c 'echo \"hello world\"'").expect("split");
    assert_eq!(words, vec!["sh", "-c", "echo \"hello world\""]);
}

#[test]
fn split_command_rejects_empty_and_unclosed_input() {
    assert!(split_command("").is_err());
    assert!(split_command("   ").is_err());
    assert!(split_command("echo 'oops").is_err());
}

#[test]
fn runner_synthesizes_endpoints_for_silent_agents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (spec, _warnings) = ResolvedSpec::from_value(&json!({
        "name": "silent",
        "command": "true",
        "timeout_seconds": 30,
    }))
    .expect("spec");
    let normalizer = spec.normalizer().expect("normalizer");
    let config = RunnerConfig {
        events_path: dir.path().join("current/silent.jsonl"),
        fixtures_path: dir.path().join("fixtures/silent.json"),
    };
    let guard = ReplayGuard::for_spec(&spec);

    let result =
        execute_spec(&spec, RunMode::Replay, &config, Some(&guard), &normalizer).expect("run");

    assert!(!result.timed_out);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.events.first().map(|event| event.event_type), Some(EventType::RunStarted));
    assert_eq!(result.events.last().map(|event| event.event_type), Some(EventType::RunFinished));
    let finished = result.events.last().expect("run_finished");
    assert_eq!(finished.payload.get("status"), Some(&json!("ok")));
}

#[test]
fn runner_marks_failed_exits_in_the_synthesized_endpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (spec, _warnings) = ResolvedSpec::from_value(&json!({
        "name": "failing",
        "command": "sh -c 'exit 3'",
        "timeout_seconds": 30,
    }))
    .expect("spec");
    let normalizer = spec.normalizer().expect("normalizer");
    let config = RunnerConfig {
        events_path: dir.path().join("current/failing.jsonl"),
        fixtures_path: dir.path().join("fixtures/failing.json"),
    };

    let result = execute_spec(&spec, RunMode::Record, &config, None, &normalizer).expect("run");

    assert_eq!(result.exit_code, Some(3));
    let finished = result.events.last().expect("run_finished");
    assert_eq!(finished.payload.get("status"), Some(&json!("error")));
    assert_eq!(finished.payload.get("exit_code"), Some(&json!(3)));
}

#[test]
fn runner_times_out_hung_agents() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (spec, _warnings) = ResolvedSpec::from_value(&json!({
        "name": "hung",
        "command": "sleep 30",
        "timeout_seconds": 1,
    }))
    .expect("spec");
    let normalizer = spec.normalizer().expect("normalizer");
    let config = RunnerConfig {
        events_path: dir.path().join("current/hung.jsonl"),
        fixtures_path: dir.path().join("fixtures/hung.json"),
    };

    let result = execute_spec(&spec, RunMode::Replay, &config, None, &normalizer).expect("run");
    assert!(result.timed_out);
    assert!(result.exit_code.is_none());
}
