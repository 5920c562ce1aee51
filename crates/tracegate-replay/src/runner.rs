// crates/tracegate-replay/src/runner.rs
// ============================================================================
// Module: Agent Runner
// Description: Agent subprocess execution with trace capture and timeout.
// Purpose: Run the spec command in record or replay mode and ingest its trace.
// Dependencies: thiserror, tracegate-core, crate::guard
// ============================================================================

//! ## Overview
//! The runner spawns the agent command with the Tracegate environment
//! contract, waits under a wall-clock timeout, and ingests the emitted JSONL
//! trace. A run that exits without a `run_finished` event gets one
//! synthesized with an error status so ingested traces always satisfy the
//! trace endpoint invariant. The runner owns the only blocking operations of
//! a spec evaluation: process wait and sequential file I/O.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tracegate_core::CanonicalNormalizer;
use tracegate_core::EventType;
use tracegate_core::ResolvedSpec;
use tracegate_core::RunId;
use tracegate_core::SCHEMA_VERSION;
use tracegate_core::TraceEvent;

use crate::guard::ReplayGuard;
use crate::sink::read_trace_file;

// ============================================================================
// SECTION: Environment Contract
// ============================================================================

/// Environment variable carrying the runner mode to the child.
pub const ENV_MODE: &str = "TRACEGATE_MODE";

/// Environment variable carrying the trace file path to the child.
pub const ENV_EVENTS_FILE: &str = "TRACEGATE_EVENTS_FILE";

/// Environment variable carrying the fixture bundle path to the child.
pub const ENV_FIXTURES_FILE: &str = "TRACEGATE_FIXTURES_FILE";

/// Environment variable carrying the run identifier to the child.
pub const ENV_RUN_ID: &str = "TRACEGATE_RUN_ID";

/// Environment variable carrying the spec name to the child.
pub const ENV_SPEC_NAME: &str = "TRACEGATE_SPEC_NAME";

/// Bytes of process output retained for diagnostics.
const OUTPUT_TAIL_BYTES: usize = 4096;

/// Poll interval while waiting on the child process.
const WAIT_POLL: Duration = Duration::from_millis(25);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Runner errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The spec command is empty or unparsable.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    /// The child process could not be spawned.
    #[error("spawn failed: {0}")]
    Spawn(String),
    /// Trace ingestion failed.
    #[error("trace ingest failed: {0}")]
    Ingest(String),
    /// Child process I/O failed.
    #[error("runner io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Run Configuration
// ============================================================================

/// Runner mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Recording: fixture store in write mode, no replay guard.
    Record,
    /// Replaying: fixture store in read mode, guard active per spec.
    Replay,
}

impl RunMode {
    /// Returns the stable label exported to the child.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Replay => "replay",
        }
    }
}

/// Paths and limits for one agent execution.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// JSONL trace file the child writes through its sink.
    pub events_path: PathBuf,
    /// Fixture bundle path (written during record, read during replay).
    pub fixtures_path: PathBuf,
}

/// Result of one agent execution.
///
/// # Invariants
/// - `events` always satisfies the trace endpoint invariant; a missing
///   `run_finished` is synthesized with an error status.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Child exit code, when the process exited on its own.
    pub exit_code: Option<i32>,
    /// Whether the wall-clock timeout fired.
    pub timed_out: bool,
    /// Trailing stdout bytes for diagnostics.
    pub stdout_tail: String,
    /// Trailing stderr bytes for diagnostics.
    pub stderr_tail: String,
    /// Ingested trace events.
    pub events: Vec<TraceEvent>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Executes the spec command and ingests its trace.
///
/// The run identifier is derived from the spec name and mode so replayed
/// traces are reproducible; `run_id` is volatile-stripped before hashing
/// either way.
///
/// # Errors
///
/// Returns [`RunnerError`] when the command cannot be spawned or the trace
/// cannot be ingested. A nonzero exit or timeout is reported in the result,
/// not as an error.
pub fn execute_spec(
    spec: &ResolvedSpec,
    mode: RunMode,
    config: &RunnerConfig,
    guard: Option<&ReplayGuard>,
    normalizer: &CanonicalNormalizer,
) -> Result<ExecutionResult, RunnerError> {
    let words = split_command(&spec.command)?;
    let (program, args) = words
        .split_first()
        .ok_or_else(|| RunnerError::InvalidCommand("command is empty".to_string()))?;

    let run_id = RunId::new(format!("run-{}-{}", spec.name, mode.as_str()));
    let mut command = Command::new(program);
    command.args(args);
    if let Some(workdir) = &spec.workdir {
        command.current_dir(workdir);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    command.env(ENV_MODE, mode.as_str());
    command.env(ENV_EVENTS_FILE, &config.events_path);
    command.env(ENV_FIXTURES_FILE, &config.fixtures_path);
    command.env(ENV_RUN_ID, run_id.as_str());
    command.env(ENV_SPEC_NAME, spec.name.as_str());
    if let Some(guard) = guard {
        for (key, value) in guard.child_env() {
            command.env(key, value);
        }
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    if let Some(parent) = config.events_path.parent() {
        std::fs::create_dir_all(parent).map_err(|error| RunnerError::Io(error.to_string()))?;
    }

    let started = Instant::now();
    let mut child = command.spawn().map_err(|error| RunnerError::Spawn(error.to_string()))?;

    let stdout_reader = child.stdout.take().map(spawn_tail_reader);
    let stderr_reader = child.stderr.take().map(spawn_tail_reader);

    let timeout = Duration::from_secs(spec.timeout_seconds);
    let mut timed_out = false;
    let exit_status = loop {
        match child.try_wait().map_err(|error| RunnerError::Io(error.to_string()))? {
            Some(status) => break Some(status),
            None => {
                if started.elapsed() >= timeout {
                    timed_out = true;
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                std::thread::sleep(WAIT_POLL);
            }
        }
    };

    let stdout_tail = stdout_reader.map(join_tail).unwrap_or_default();
    let stderr_tail = stderr_reader.map(join_tail).unwrap_or_default();
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let mut events = if config.events_path.exists() {
        read_trace_file(&config.events_path, normalizer)
            .map_err(|error| RunnerError::Ingest(error.to_string()))?
    } else {
        Vec::new()
    };
    let exit_code = exit_status.and_then(|status| status.code());
    synthesize_endpoints(&mut events, spec, &run_id, exit_code, &stderr_tail, duration_ms);

    Ok(ExecutionResult {
        exit_code,
        timed_out,
        stdout_tail,
        stderr_tail,
        events,
        duration_ms,
    })
}

// ============================================================================
// SECTION: Endpoint Synthesis
// ============================================================================

/// Synthesizes `run_started`/`run_finished` when the agent crashed before
/// emitting them.
fn synthesize_endpoints(
    events: &mut Vec<TraceEvent>,
    spec: &ResolvedSpec,
    run_id: &RunId,
    exit_code: Option<i32>,
    stderr_tail: &str,
    duration_ms: u64,
) {
    if events.first().is_none_or(|event| event.event_type != EventType::RunStarted) {
        let mut payload = Map::new();
        payload.insert("spec_name".to_string(), Value::String(spec.name.as_str().to_string()));
        events.insert(
            0,
            synthetic_event(EventType::RunStarted, 0, run_id.clone(), 0, payload),
        );
        let mut seq = 1;
        for event in events.iter_mut() {
            event.seq = seq;
            seq += 1;
        }
    }
    if events.last().is_none_or(|event| event.event_type != EventType::RunFinished) {
        let next_seq = events.last().map_or(1, |event| event.seq + 1);
        let clean_exit = exit_code == Some(0);
        let mut payload = Map::new();
        payload.insert(
            "status".to_string(),
            Value::String(if clean_exit { "ok" } else { "error" }.to_string()),
        );
        if let Some(code) = exit_code {
            payload.insert("exit_code".to_string(), Value::from(code));
        }
        if !clean_exit && !stderr_tail.is_empty() {
            payload.insert("stderr_tail".to_string(), Value::String(stderr_tail.to_string()));
        }
        events.push(synthetic_event(
            EventType::RunFinished,
            next_seq,
            run_id.clone(),
            duration_ms,
            payload,
        ));
    }
}

fn synthetic_event(
    event_type: EventType,
    seq: u64,
    run_id: RunId,
    rel_ms: u64,
    payload: Map<String, Value>,
) -> TraceEvent {
    TraceEvent {
        schema_version: SCHEMA_VERSION.to_string(),
        event_type,
        seq,
        run_id,
        rel_ms,
        payload,
        meta: Map::new(),
        event_id: String::new(),
    }
}

// ============================================================================
// SECTION: Process Output
// ============================================================================

/// Spawns a reader thread draining a child pipe, keeping the trailing bytes.
fn spawn_tail_reader<R: std::io::Read + Send + 'static>(
    pipe: R,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut pipe = pipe;
        let mut buffer = Vec::new();
        let _ = std::io::Read::read_to_end(&mut pipe, &mut buffer);
        let start = buffer.len().saturating_sub(OUTPUT_TAIL_BYTES);
        String::from_utf8_lossy(&buffer[start ..]).into_owned()
    })
}

/// Joins a tail reader thread, tolerating reader panics.
fn join_tail(handle: std::thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

// ============================================================================
// SECTION: Command Parsing
// ============================================================================

/// Splits a command line into words with single/double-quote handling.
///
/// # Errors
///
/// Returns [`RunnerError::InvalidCommand`] for empty input or an unclosed
/// quote.
pub fn split_command(command: &str) -> Result<Vec<String>, RunnerError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for ch in command.chars() {
        match quote {
            Some(active) => {
                if ch == active {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    in_word = true;
                }
                ch if ch.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                ch => {
                    current.push(ch);
                    in_word = true;
                }
            },
        }
    }
    if quote.is_some() {
        return Err(RunnerError::InvalidCommand("unclosed quote".to_string()));
    }
    if in_word {
        words.push(current);
    }
    if words.is_empty() {
        return Err(RunnerError::InvalidCommand("command is empty".to_string()));
    }
    Ok(words)
}
