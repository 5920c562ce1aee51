// crates/tracegate-replay/src/sink.rs
// ============================================================================
// Module: Event Sink
// Description: Thread-safe event emission with atomic sequence assignment.
// Purpose: Serialize concurrent emission points into one ordered JSONL trace.
// Dependencies: serde_json, thiserror, tracegate-core
// ============================================================================

//! ## Overview
//! Events may be emitted from arbitrary call sites. The sink serializes them
//! behind one lock that atomically assigns `seq` and appends the canonical
//! line, so the wire contract of a strict per-run ordering holds regardless
//! of caller structure. No cross-run ordering exists.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tracegate_core::CanonicalNormalizer;
use tracegate_core::EventType;
use tracegate_core::RunId;
use tracegate_core::SCHEMA_VERSION;
use tracegate_core::TraceEvent;
use tracegate_core::core::events::parse_jsonl;
use tracegate_core::hashing::canonical_json_bytes;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Sink errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Trace file I/O failed.
    #[error("sink io error: {0}")]
    Io(String),
    /// The event could not be serialized.
    #[error("sink serialization error: {0}")]
    Serialize(String),
    /// The sink lock was poisoned by a panicking writer.
    #[error("sink lock poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Emit Sink
// ============================================================================

/// Internal sink state behind the lock.
#[derive(Debug)]
struct SinkState {
    writer: BufWriter<File>,
    next_seq: u64,
    started: Instant,
}

/// Thread-safe JSONL event sink for one run.
///
/// # Invariants
/// - `seq` assignment and line append happen under one lock acquisition.
/// - Lines are flushed per event so a crashed agent leaves a usable prefix.
#[derive(Debug)]
pub struct EmitSink {
    run_id: RunId,
    state: Mutex<SinkState>,
}

impl EmitSink {
    /// Creates a sink writing to the given trace file (truncating).
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the file cannot be created.
    pub fn create(path: &Path, run_id: RunId) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| SinkError::Io(error.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|error| SinkError::Io(error.to_string()))?;
        Ok(Self {
            run_id,
            state: Mutex::new(SinkState {
                writer: BufWriter::new(file),
                next_seq: 1,
                started: Instant::now(),
            }),
        })
    }

    /// Emits one event, assigning its sequence number atomically.
    ///
    /// Returns the assigned `seq`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when serialization or the append fails.
    pub fn emit(
        &self,
        event_type: EventType,
        payload: Map<String, Value>,
        meta: Map<String, Value>,
    ) -> Result<u64, SinkError> {
        let mut state = self.state.lock().map_err(|_| SinkError::Poisoned)?;
        let seq = state.next_seq;
        let rel_ms = u64::try_from(state.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let event = TraceEvent {
            schema_version: SCHEMA_VERSION.to_string(),
            event_type,
            seq,
            run_id: self.run_id.clone(),
            rel_ms,
            payload,
            meta,
            event_id: String::new(),
        };
        let line =
            canonical_json_bytes(&event).map_err(|error| SinkError::Serialize(error.to_string()))?;
        state.writer.write_all(&line).map_err(|error| SinkError::Io(error.to_string()))?;
        state.writer.write_all(b"\n").map_err(|error| SinkError::Io(error.to_string()))?;
        state.writer.flush().map_err(|error| SinkError::Io(error.to_string()))?;
        state.next_seq = seq + 1;
        Ok(seq)
    }
}

// ============================================================================
// SECTION: Trace Reader
// ============================================================================

/// Reads a JSONL trace file, populating missing event ids.
///
/// # Errors
///
/// Returns [`SinkError`] when the file cannot be read or a line is invalid.
pub fn read_trace_file(
    path: &Path,
    normalizer: &CanonicalNormalizer,
) -> Result<Vec<TraceEvent>, SinkError> {
    let text = std::fs::read_to_string(path).map_err(|error| SinkError::Io(error.to_string()))?;
    parse_jsonl(&text, normalizer).map_err(|error| SinkError::Serialize(error.to_string()))
}
