// crates/tracegate-core/src/core/contracts.rs
// ============================================================================
// Module: Contract Monitor
// Description: Evaluation of declared obligations over the candidate trace.
// Purpose: Emit violations anchored to the earliest observable event index.
// Dependencies: bigdecimal, regex, serde_json, crate::core::{events, predicates, spec, violation}
// ============================================================================

//! ## Overview
//! The monitor evaluates every enabled obligation family in a fixed order:
//! tool policy, budgets, sequence, side effects, network, data leak, args.
//! Within a family, checks apply to events in ascending `seq`. Evaluation
//! never short-circuits; every violation is collected so primary selection
//! stays total. Numeric range checks are decimal-aware and deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use regex::Regex;
use serde_json::Number;
use serde_json::Value;
use serde_json::json;

use crate::core::events::EventKind;
use crate::core::events::EventType;
use crate::core::events::NormalizedEvent;
use crate::core::identifiers::ToolName;
use crate::core::predicates::contains_email;
use crate::core::predicates::contains_phone;
use crate::core::predicates::extract_domains;
use crate::core::spec::ArgFieldSpec;
use crate::core::spec::ArgType;
use crate::core::spec::NetworkDefault;
use crate::core::spec::ResolvedSpec;
use crate::core::spec::SpecError;
use crate::core::violation::FailureClass;
use crate::core::violation::Violation;
use crate::core::violation::codes;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Name fragments that mark a tool as write-like.
const WRITE_TOOL_HINTS: &[&str] =
    &["create", "delete", "insert", "patch", "rm", "remove", "save", "update", "upsert", "write"];

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Evaluates all enabled obligations against the candidate trace.
///
/// # Errors
///
/// Returns [`SpecError`] when an arg-schema regex fails to compile; the spec
/// is expected to have been validated beforehand, so this is defensive only
/// at the crate boundary.
pub fn evaluate_contracts(
    events: &[NormalizedEvent],
    spec: &ResolvedSpec,
) -> Result<Vec<Violation>, SpecError> {
    let mut violations = Vec::new();
    let run_finished_index = run_finished_index(events);

    check_tool_policy(events, spec, &mut violations);
    check_budgets(events, spec, run_finished_index, &mut violations);
    check_sequence(events, spec, run_finished_index, &mut violations);
    check_side_effects(events, spec, &mut violations);
    check_network(events, spec, &mut violations);
    check_data_leak(events, spec, &mut violations);
    check_args(events, spec, &mut violations)?;

    Ok(violations)
}

/// Returns the anchoring index for end-of-run obligations.
fn run_finished_index(events: &[NormalizedEvent]) -> u64 {
    events
        .iter()
        .rev()
        .find(|event| event.event_type == EventType::RunFinished)
        .or_else(|| events.last())
        .map_or(1, |event| event.seq)
}

/// Iterates tool-call events in ascending `seq`.
fn tool_calls(events: &[NormalizedEvent]) -> impl Iterator<Item = &NormalizedEvent> {
    events.iter().filter(|event| event.kind == EventKind::ToolCall)
}

// ============================================================================
// SECTION: Tool Policy
// ============================================================================

fn check_tool_policy(
    events: &[NormalizedEvent],
    spec: &ResolvedSpec,
    violations: &mut Vec<Violation>,
) {
    let tools = &spec.contracts.tools;
    for event in tool_calls(events) {
        let name = event.name.as_str();
        if tools.deny.contains(name) {
            violations.push(
                Violation::new(
                    codes::CONTRACT_TOOL_DENIED,
                    FailureClass::Contract,
                    event.seq,
                    format!("contract denied tool call: {name}"),
                )
                .with_observed(Value::String(name.to_string()))
                .with_hint("Remove the call or drop the tool from contracts.tools.deny."),
            );
        } else if !tools.allow.is_empty() && !tools.allow.contains(name) {
            violations.push(
                Violation::new(
                    codes::CONTRACT_TOOL_NOT_ALLOWED,
                    FailureClass::Contract,
                    event.seq,
                    format!("tool call not in contracts.tools.allow: {name}"),
                )
                .with_expected(json!(
                    tools.allow.iter().map(ToolName::as_str).collect::<Vec<&str>>()
                ))
                .with_observed(Value::String(name.to_string())),
            );
        }
    }
}

// ============================================================================
// SECTION: Budgets
// ============================================================================

fn check_budgets(
    events: &[NormalizedEvent],
    spec: &ResolvedSpec,
    run_finished_index: u64,
    violations: &mut Vec<Violation>,
) {
    let tools = &spec.contracts.tools;
    let budgets = &spec.budget_thresholds;

    let mut total_calls = 0_u64;
    let mut per_tool: BTreeMap<&str, u64> = BTreeMap::new();
    let mut total_reported = false;
    let mut threshold_reported = false;
    let mut per_tool_reported: BTreeSet<&str> = BTreeSet::new();

    for event in tool_calls(events) {
        total_calls += 1;
        let name = event.name.as_str();
        let count = per_tool.entry(name).or_insert(0);
        *count += 1;

        if let Some(limit) = tools.max_calls_total
            && total_calls > limit
            && !total_reported
        {
            total_reported = true;
            violations.push(
                Violation::new(
                    codes::CONTRACT_MAX_CALLS_TOTAL_EXCEEDED,
                    FailureClass::Contract,
                    event.seq,
                    format!("contracts.tools.max_calls_total exceeded (limit={limit})"),
                )
                .with_expected(json!(limit))
                .with_observed(json!(total_calls)),
            );
        }
        if let Some(limit) = tools.max_calls_per_tool.get(name)
            && *count > *limit
            && !per_tool_reported.contains(name)
        {
            per_tool_reported.insert(name);
            violations.push(
                Violation::new(
                    codes::CONTRACT_MAX_CALLS_PER_TOOL_EXCEEDED,
                    FailureClass::Contract,
                    event.seq,
                    format!("contracts.tools.max_calls_per_tool exceeded for {name} (limit={limit})"),
                )
                .with_expected(json!(limit))
                .with_observed(json!(*count)),
            );
        }
        if let Some(limit) = budgets.max_tool_calls
            && total_calls > limit
            && !threshold_reported
        {
            threshold_reported = true;
            violations.push(
                Violation::new(
                    codes::BUDGET_TOOL_CALLS_EXCEEDED,
                    FailureClass::Contract,
                    event.seq,
                    format!("budget_thresholds.max_tool_calls exceeded (limit={limit})"),
                )
                .with_expected(json!(limit))
                .with_observed(json!(total_calls)),
            );
        }
    }

    if let Some(limit) = budgets.max_latency_ms {
        let final_rel_ms = events.last().map_or(0, |event| event.rel_ms);
        if final_rel_ms > limit {
            violations.push(
                Violation::new(
                    codes::BUDGET_LATENCY_EXCEEDED,
                    FailureClass::Contract,
                    run_finished_index,
                    format!("budget_thresholds.max_latency_ms exceeded (limit={limit})"),
                )
                .with_expected(json!(limit))
                .with_observed(json!(final_rel_ms)),
            );
        }
    }

    if let Some(limit) = budgets.max_tokens {
        let mut cumulative = 0_u64;
        for event in events {
            if event.event_type != EventType::LlmReturned {
                continue;
            }
            let Some(tokens) = usage_tokens(&event.payload) else {
                // Token metadata absent: the check is skipped without violation.
                continue;
            };
            cumulative += tokens;
            if cumulative > limit {
                violations.push(
                    Violation::new(
                        codes::BUDGET_TOKENS_EXCEEDED,
                        FailureClass::Contract,
                        event.seq,
                        format!("budget_thresholds.max_tokens exceeded (limit={limit})"),
                    )
                    .with_expected(json!(limit))
                    .with_observed(json!(cumulative)),
                );
                break;
            }
        }
    }
}

/// Reads `usage.prompt_tokens + usage.completion_tokens` when present.
fn usage_tokens(payload: &Value) -> Option<u64> {
    let usage = payload.get("usage")?.as_object()?;
    let prompt = usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0);
    let completion = usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0);
    if usage.contains_key("prompt_tokens") || usage.contains_key("completion_tokens") {
        Some(prompt + completion)
    } else {
        None
    }
}

// ============================================================================
// SECTION: Sequence
// ============================================================================

fn check_sequence(
    events: &[NormalizedEvent],
    spec: &ResolvedSpec,
    run_finished_index: u64,
    violations: &mut Vec<Violation>,
) {
    let sequence = &spec.contracts.sequence;
    let observed: Vec<(u64, &str)> =
        tool_calls(events).map(|event| (event.seq, event.name.as_str())).collect();

    for required in sequence.require.iter().chain(sequence.eventually.iter()) {
        if !observed.iter().any(|(_, name)| *name == required.as_str()) {
            violations.push(
                Violation::new(
                    codes::CONTRACT_SEQUENCE_REQUIRED_MISSING,
                    FailureClass::Contract,
                    run_finished_index,
                    format!("required sequence name missing: {required}"),
                )
                .with_expected(Value::String(required.as_str().to_string()))
                .with_observed(json!(observed.iter().map(|(_, name)| *name).collect::<Vec<&str>>())),
            );
        }
    }

    for forbidden in sequence.forbid.iter().chain(sequence.never.iter()) {
        if let Some((seq, name)) =
            observed.iter().find(|(_, name)| *name == forbidden.as_str())
        {
            violations.push(
                Violation::new(
                    codes::CONTRACT_SEQUENCE_NEVER_SEEN,
                    FailureClass::Contract,
                    *seq,
                    format!("forbidden sequence name observed: {name}"),
                )
                .with_observed(Value::String((*name).to_string())),
            );
        }
    }

    for pair in &sequence.require_before {
        let first_after =
            observed.iter().find(|(_, name)| *name == pair.after.as_str()).copied();
        let first_before =
            observed.iter().find(|(_, name)| *name == pair.before.as_str()).copied();
        if let Some((after_seq, _)) = first_after {
            let satisfied =
                first_before.is_some_and(|(before_seq, _)| before_seq < after_seq);
            if !satisfied {
                violations.push(
                    Violation::new(
                        codes::SEQUENCE_REQUIRE_BEFORE,
                        FailureClass::Contract,
                        after_seq,
                        format!("{} must precede {}", pair.before, pair.after),
                    )
                    .with_expected(json!({
                        "before": pair.before.as_str(),
                        "after": pair.after.as_str(),
                    }))
                    .with_observed(Value::String(pair.after.as_str().to_string())),
                );
            }
        }
    }

    for limited in &sequence.at_most_once {
        let mut occurrences =
            observed.iter().filter(|(_, name)| *name == limited.as_str());
        let _first = occurrences.next();
        if let Some((second_seq, name)) = occurrences.next() {
            violations.push(
                Violation::new(
                    codes::CONTRACT_SEQUENCE_AT_MOST_ONCE_EXCEEDED,
                    FailureClass::Contract,
                    *second_seq,
                    format!("sequence name observed more than once: {name}"),
                )
                .with_observed(Value::String((*name).to_string())),
            );
        }
    }
}

// ============================================================================
// SECTION: Side Effects
// ============================================================================

/// Reports whether a tool name is write-like for side-effect policy.
fn is_write_tool(spec: &ResolvedSpec, name: &str) -> bool {
    if spec.side_effect_tools.contains(name) {
        return true;
    }
    let normalized = name.trim().to_ascii_lowercase();
    WRITE_TOOL_HINTS.iter().any(|hint| normalized.contains(hint))
}

fn check_side_effects(
    events: &[NormalizedEvent],
    spec: &ResolvedSpec,
    violations: &mut Vec<Violation>,
) {
    if !spec.contracts.side_effects.deny_write_tools {
        return;
    }
    for event in tool_calls(events) {
        let name = event.name.as_str();
        if is_write_tool(spec, name) {
            violations.push(
                Violation::new(
                    codes::CONTRACT_WRITE_TOOL_DENIED,
                    FailureClass::Contract,
                    event.seq,
                    format!("write-side-effect tool blocked by policy: {name}"),
                )
                .with_observed(Value::String(name.to_string()))
                .with_hint("Disable contracts.side_effects.deny_write_tools or drop the call."),
            );
        }
    }
}

// ============================================================================
// SECTION: Network
// ============================================================================

fn check_network(
    events: &[NormalizedEvent],
    spec: &ResolvedSpec,
    violations: &mut Vec<Violation>,
) {
    let network = &spec.contracts.network;
    if network.policy != NetworkDefault::Deny {
        return;
    }
    for event in events {
        if !matches!(event.kind, EventKind::ToolCall | EventKind::LlmRequest) {
            continue;
        }
        let offending: Vec<String> = extract_domains(&event.payload)
            .into_iter()
            .filter(|domain| !network.allow_domains.contains(domain))
            .collect();
        if !offending.is_empty() {
            violations.push(
                Violation::new(
                    codes::CONTRACT_NETWORK_DENIED,
                    FailureClass::Contract,
                    event.seq,
                    format!("outbound domain denied by network policy: {}", offending.join(", ")),
                )
                .with_expected(json!(
                    network.allow_domains.iter().collect::<Vec<&String>>()
                ))
                .with_observed(json!(offending))
                .with_hint("Add the domain to contracts.network.allow_domains if approved."),
            );
        }
    }
}

// ============================================================================
// SECTION: Data Leak
// ============================================================================

fn check_data_leak(
    events: &[NormalizedEvent],
    spec: &ResolvedSpec,
    violations: &mut Vec<Violation>,
) {
    if !spec.contracts.data_leak.deny_pii_outbound {
        return;
    }
    let kinds = spec.outbound_kinds();
    for event in events {
        if !kinds.contains(&event.kind) {
            continue;
        }
        let email = contains_email(&event.payload);
        let phone = contains_phone(&event.payload);
        if email || phone {
            let detector = if email { "email" } else { "phone" };
            violations.push(
                Violation::new(
                    codes::CONTRACT_DATA_LEAK_PII,
                    FailureClass::Contract,
                    event.seq,
                    format!("PII ({detector}) detected in outbound payload"),
                )
                .with_observed(Value::String(detector.to_string()))
                .with_hint("Redact the field or disable contracts.data_leak.deny_pii_outbound."),
            );
            return;
        }
    }
}

// ============================================================================
// SECTION: Args
// ============================================================================

fn check_args(
    events: &[NormalizedEvent],
    spec: &ResolvedSpec,
    violations: &mut Vec<Violation>,
) -> Result<(), SpecError> {
    if spec.contracts.args.is_empty() {
        return Ok(());
    }
    for event in tool_calls(events) {
        let Some(schema) = spec.contracts.args.get(event.name.as_str()) else {
            continue;
        };
        let kwargs = event
            .payload
            .get("input")
            .and_then(|input| input.get("kwargs"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        for required in &schema.required {
            if !kwargs.contains_key(required) {
                violations.push(
                    Violation::new(
                        codes::CONTRACT_ARG_REQUIRED_MISSING,
                        FailureClass::Contract,
                        event.seq,
                        format!("{}: required argument missing: {required}", event.name),
                    )
                    .with_expected(Value::String(required.clone())),
                );
            }
        }

        for (field, field_spec) in &schema.fields {
            let Some(value) = kwargs.get(field) else {
                continue;
            };
            check_arg_field(event, field, field_spec, value, violations)?;
        }
    }
    Ok(())
}

fn check_arg_field(
    event: &NormalizedEvent,
    field: &str,
    field_spec: &ArgFieldSpec,
    value: &Value,
    violations: &mut Vec<Violation>,
) -> Result<(), SpecError> {
    if let Some(expected_type) = field_spec.field_type
        && !matches_type(value, expected_type)
    {
        violations.push(
            Violation::new(
                codes::CONTRACT_ARG_TYPE,
                FailureClass::Contract,
                event.seq,
                format!("{}.{field}: expected {}", event.name, expected_type.as_str()),
            )
            .with_expected(Value::String(expected_type.as_str().to_string()))
            .with_observed(value.clone()),
        );
        return Ok(());
    }

    if field_spec.min.is_some() || field_spec.max.is_some() {
        if let Value::Number(number) = value {
            let below = field_spec
                .min
                .as_ref()
                .is_some_and(|bound| decimal_cmp(number, bound) == Some(Ordering::Less));
            let above = field_spec
                .max
                .as_ref()
                .is_some_and(|bound| decimal_cmp(number, bound) == Some(Ordering::Greater));
            if below || above {
                violations.push(
                    Violation::new(
                        codes::CONTRACT_ARG_RANGE,
                        FailureClass::Contract,
                        event.seq,
                        format!("{}.{field}: value outside permitted range", event.name),
                    )
                    .with_expected(json!({
                        "min": field_spec.min,
                        "max": field_spec.max,
                    }))
                    .with_observed(value.clone()),
                );
            }
        }
    }

    if let Some(allowed) = &field_spec.allowed
        && !allowed.contains(value)
    {
        violations.push(
            Violation::new(
                codes::CONTRACT_ARG_ENUM,
                FailureClass::Contract,
                event.seq,
                format!("{}.{field}: value outside permitted set", event.name),
            )
            .with_expected(json!(allowed))
            .with_observed(value.clone()),
        );
    }

    if let Some(pattern) = &field_spec.regex
        && let Value::String(text) = value
    {
        let compiled = Regex::new(pattern).map_err(|error| SpecError::InvalidArgRegex {
            tool: event.name.clone(),
            field: field.to_string(),
            message: error.to_string(),
        })?;
        if !compiled.is_match(text) {
            violations.push(
                Violation::new(
                    codes::CONTRACT_ARG_REGEX,
                    FailureClass::Contract,
                    event.seq,
                    format!("{}.{field}: value does not match required pattern", event.name),
                )
                .with_expected(Value::String(pattern.clone()))
                .with_observed(value.clone()),
            );
        }
    }

    Ok(())
}

/// Reports whether a JSON value matches the declared arg type.
fn matches_type(value: &Value, expected: ArgType) -> bool {
    match expected {
        ArgType::String => value.is_string(),
        ArgType::Number => value.is_number(),
        ArgType::Integer => value.is_i64() || value.is_u64(),
        ArgType::Boolean => value.is_boolean(),
        ArgType::Array => value.is_array(),
        ArgType::Object => value.is_object(),
    }
}

/// Orders JSON numbers using decimal-aware comparison.
fn decimal_cmp(left: &Number, right: &Number) -> Option<Ordering> {
    let left = BigDecimal::from_str(&left.to_string()).ok()?;
    let right = BigDecimal::from_str(&right.to_string()).ok()?;
    Some(left.cmp(&right))
}
