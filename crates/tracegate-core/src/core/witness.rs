// crates/tracegate-core/src/core/witness.rs
// ============================================================================
// Module: Verdict and Witness Resolution
// Description: Earliest-witness selection and deterministic primary choice.
// Purpose: Turn a violation union into a stable, reproducible verdict.
// Dependencies: serde, crate::core::violation
// ============================================================================

//! ## Overview
//! Given the union of contract and refinement violations, the resolver picks
//! the smallest event index as the witness and applies a strict tie-break
//! among the violations anchored there: failure-class precedence
//! (REFINEMENT < CONTRACT < TOOLING), then lexicographic ASCII order of the
//! code, then original emission order. The resolver has no side effects and
//! is bit-for-bit reproducible for a given violation set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::violation::Violation;

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolved witness with its primary violation.
///
/// # Invariants
/// - `witness_index` equals the minimum `event_index` over all violations.
/// - `all_at_witness` is ordered by the tie-break relation, primary first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessResolution {
    /// Earliest event index at which any violation is observable.
    pub witness_index: u64,
    /// Deterministically chosen primary violation.
    pub primary: Violation,
    /// All violations anchored at the witness, tie-break ordered.
    pub all_at_witness: Vec<Violation>,
}

/// Resolves the witness and primary violation for a violation union.
///
/// Returns `None` when the union is empty (a PASS verdict).
#[must_use]
pub fn resolve_witness(violations: &[Violation]) -> Option<WitnessResolution> {
    let witness_index = violations.iter().map(|violation| violation.event_index).min()?;
    let mut at_witness: Vec<Violation> = violations
        .iter()
        .filter(|violation| violation.event_index == witness_index)
        .cloned()
        .collect();
    // Stable sort preserves original emission order as the final tie-break.
    at_witness.sort_by(|left, right| {
        left.failure_class
            .rank()
            .cmp(&right.failure_class.rank())
            .then_with(|| left.code.cmp(&right.code))
    });
    let primary = at_witness.first()?.clone();
    Some(WitnessResolution {
        witness_index,
        primary,
        all_at_witness: at_witness,
    })
}
