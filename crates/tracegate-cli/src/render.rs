// crates/tracegate-cli/src/render.rs
// ============================================================================
// Module: Report Rendering
// Description: Markdown rendering for the latest verdict artifact.
// Purpose: Produce the human-facing summary persisted next to latest.json.
// Dependencies: tracegate-core
// ============================================================================

//! ## Overview
//! The renderer is a small deterministic serializer from the verdict report
//! to Markdown. It includes no timestamps and no environment details, so the
//! artifact is reproducible for identical inputs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use tracegate_core::TrtReport;
use tracegate_core::TrtStatus;

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders the verdict report as Markdown.
#[must_use]
pub fn render_markdown(report: &TrtReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Tracegate Report");
    let _ = writeln!(out);
    let status_marker = match report.trt_status {
        TrtStatus::Pass => "✅ PASS",
        TrtStatus::Fail => "❌ FAIL",
    };
    let _ = writeln!(out, "**{}**: {}", report.spec_name, status_marker);
    let _ = writeln!(out);

    if let Some(primary) = &report.primary_violation {
        let _ = writeln!(out, "## Primary violation");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Field | Value |");
        let _ = writeln!(out, "|---|---|");
        let _ = writeln!(out, "| Code | `{}` |", primary.code);
        let _ = writeln!(out, "| Class | {} |", primary.failure_class.as_str());
        let _ = writeln!(out, "| Witness seq | {} |", primary.event_index);
        let _ = writeln!(out, "| Message | {} |", primary.message);
        if let Some(hint) = &primary.hint {
            let _ = writeln!(out, "| Hint | {hint} |");
        }
        let _ = writeln!(out);
    }

    if report.all_violations_at_witness.len() > 1 {
        let _ = writeln!(out, "## All violations at witness");
        let _ = writeln!(out);
        for violation in &report.all_violations_at_witness {
            let _ = writeln!(
                out,
                "- `{}` ({}) at seq {}: {}",
                violation.code,
                violation.failure_class.as_str(),
                violation.event_index,
                violation.message
            );
        }
        let _ = writeln!(out);
    }

    if !report.counterexample_paths.is_empty() {
        let _ = writeln!(out, "## Counterexample artifacts");
        let _ = writeln!(out);
        for (role, path) in &report.counterexample_paths {
            let _ = writeln!(out, "- {role}: `{path}`");
        }
        let _ = writeln!(out);
    }

    if let Some(stats) = &report.shrink_stats {
        let _ = writeln!(out, "## Shrink");
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} events → {} events in {} iterations",
            stats.original_len, stats.reduced_len, stats.iterations
        );
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## Repro");
    let _ = writeln!(out);
    let _ = writeln!(out, "```");
    let _ = writeln!(out, "{}", report.repro_command);
    let _ = writeln!(out, "```");
    out
}
