// crates/tracegate-core/src/core/shrink.rs
// ============================================================================
// Module: Counterexample Shrinker
// Description: Bounded ddmin reduction over candidate traces.
// Purpose: Produce smaller failing traces that preserve the failure identity.
// Dependencies: thiserror, crate::core::events
// ============================================================================

//! ## Overview
//! The shrinker is a bounded delta-debugging loop over the interior events of
//! a failing candidate trace. `run_started` and `run_finished` are never
//! candidates for removal. A reduction is accepted only when the caller's
//! predicate confirms the reduced trace still fails with the same failure
//! class and primary code; the predicate re-runs the full pipeline, so every
//! accepted trace is re-validated end to end. Events are only dropped, never
//! mutated, and the original trace is always a valid fallback.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::core::events::TraceEvent;
use crate::core::report::ShrinkStats;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Shrinker input errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ShrinkError {
    /// A budget bound is not positive.
    #[error("shrink bounds must be positive")]
    InvalidBounds,
    /// The input trace is too small to shrink.
    #[error("trace must contain run_started and run_finished")]
    TraceTooSmall,
    /// The failure predicate does not hold for the original trace.
    #[error("failure predicate must hold for the original trace")]
    PredicateDoesNotHold,
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Shrinker outcome: the smallest accepted trace and its statistics.
#[derive(Debug, Clone)]
pub struct ShrinkOutcome {
    /// Smallest accepted failing trace (the original when nothing reduced).
    pub events: Vec<TraceEvent>,
    /// Reduction statistics.
    pub stats: ShrinkStats,
}

// ============================================================================
// SECTION: ddmin
// ============================================================================

/// Runs bounded ddmin over the interior of a failing trace.
///
/// `failure_predicate` must return true exactly when the reduced trace still
/// fails with the same `(failure_class, primary code)` pair as the original.
///
/// # Errors
///
/// Returns [`ShrinkError`] when bounds are invalid, the trace has no
/// interior, or the predicate rejects the original trace.
pub fn ddmin_shrink<F>(
    events: &[TraceEvent],
    mut failure_predicate: F,
    max_seconds: f64,
    max_iterations: u64,
) -> Result<ShrinkOutcome, ShrinkError>
where
    F: FnMut(&[TraceEvent]) -> bool,
{
    if max_seconds <= 0.0 || max_iterations == 0 {
        return Err(ShrinkError::InvalidBounds);
    }
    if events.len() < 2 {
        return Err(ShrinkError::TraceTooSmall);
    }
    if !failure_predicate(events) {
        return Err(ShrinkError::PredicateDoesNotHold);
    }

    let started = Instant::now();
    let budget = Duration::from_secs_f64(max_seconds);
    let first = events[0].clone();
    let last = events[events.len() - 1].clone();
    let mut interior: Vec<TraceEvent> = events[1 .. events.len() - 1].to_vec();
    let mut granularity = 2_usize;
    let mut iterations = 0_u64;

    while interior.len() >= 2 {
        if started.elapsed() >= budget || iterations >= max_iterations {
            break;
        }

        let chunk_size = interior.len().div_ceil(granularity).max(1);
        let mut reduced_this_round = false;
        let mut start = 0_usize;

        while start < interior.len() {
            if started.elapsed() >= budget || iterations >= max_iterations {
                break;
            }
            let end = (start + chunk_size).min(interior.len());
            let mut candidate_interior = Vec::with_capacity(interior.len() - (end - start));
            candidate_interior.extend_from_slice(&interior[.. start]);
            candidate_interior.extend_from_slice(&interior[end ..]);

            let candidate = assemble(&first, &candidate_interior, &last);
            iterations += 1;
            if failure_predicate(&candidate) {
                interior = candidate_interior;
                granularity = granularity.saturating_sub(1).max(2);
                reduced_this_round = true;
                break;
            }
            start = end;
        }

        if !reduced_this_round {
            if granularity >= interior.len() {
                break;
            }
            granularity = (granularity * 2).min(interior.len());
        }
    }

    let reduced = assemble(&first, &interior, &last);
    let seconds = started.elapsed().as_secs_f64();
    Ok(ShrinkOutcome {
        stats: ShrinkStats {
            original_len: events.len(),
            reduced_len: reduced.len(),
            iterations,
            // Stats are diagnostic; rounding keeps report payloads compact.
            seconds: (seconds * 1_000_000.0).round() / 1_000_000.0,
        },
        events: reduced,
    })
}

/// Reassembles a trace from its protected endpoints and interior.
fn assemble(first: &TraceEvent, interior: &[TraceEvent], last: &TraceEvent) -> Vec<TraceEvent> {
    let mut events = Vec::with_capacity(interior.len() + 2);
    events.push(first.clone());
    events.extend_from_slice(interior);
    events.push(last.clone());
    events
}
