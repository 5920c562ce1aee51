// crates/tracegate-replay/src/guard.rs
// ============================================================================
// Module: Replay Guard
// Description: Offline-mode egress gate for agent subprocesses.
// Purpose: Convert accidental network use into explicit deterministic failure.
// Dependencies: serde_json, thiserror, url, tracegate-core
// ============================================================================

//! ## Overview
//! Determinism requires that replays never consult live providers. The guard
//! is a scoped resource with the lifetime of one agent subprocess: it exports
//! an environment contract that conforming SDK sinks and tool shims consult,
//! and exposes the gate API that converts attempted egress into a
//! deterministic tooling failure. Loopback hosts and UNIX-domain sockets used
//! by the engine's own instrumentation are always permitted; the spec's
//! domain allowlist selectively permits exact-match hostnames and is echoed
//! into report metadata.
//!
//! The guard is never shared across spec boundaries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::net::IpAddr;

use thiserror::Error;
use tracegate_core::FailureClass;
use tracegate_core::ReplayMode;
use tracegate_core::ResolvedSpec;
use tracegate_core::Violation;
use tracegate_core::codes;
use url::Host;

// ============================================================================
// SECTION: Environment Contract
// ============================================================================

/// Environment variable carrying the replay mode to the child.
pub const ENV_REPLAY_MODE: &str = "TRACEGATE_REPLAY_MODE";

/// Environment variable carrying the sorted domain allowlist to the child.
pub const ENV_NET_ALLOW: &str = "TRACEGATE_NET_ALLOW";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Guard gate errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Outbound network access blocked in offline mode.
    #[error("offline replay blocks network access to {host}")]
    NetworkBlocked {
        /// Denied hostname.
        host: String,
    },
    /// Subprocess escape blocked in offline mode.
    #[error("offline replay blocks subprocess spawn: {program}")]
    SubprocessBlocked {
        /// Denied program name.
        program: String,
    },
}

// ============================================================================
// SECTION: Replay Guard
// ============================================================================

/// Per-subprocess offline egress guard.
///
/// # Invariants
/// - Installed once at subprocess start; dropped at subprocess exit.
/// - In online mode every check passes.
#[derive(Debug, Clone)]
pub struct ReplayGuard {
    mode: ReplayMode,
    allow_domains: BTreeSet<String>,
}

impl ReplayGuard {
    /// Builds the guard for a spec's replay configuration.
    #[must_use]
    pub fn for_spec(spec: &ResolvedSpec) -> Self {
        Self {
            mode: spec.replay.mode,
            allow_domains: spec.contracts.network.allow_domains.clone(),
        }
    }

    /// Reports whether offline enforcement is active.
    #[must_use]
    pub const fn offline(&self) -> bool {
        matches!(self.mode, ReplayMode::Offline)
    }

    /// Checks an outbound connection attempt against the guard policy.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::NetworkBlocked`] for non-loopback hosts outside
    /// the allowlist while offline.
    pub fn check_outbound(&self, host: &str) -> Result<(), GuardError> {
        if !self.offline() {
            return Ok(());
        }
        if is_loopback(host) {
            return Ok(());
        }
        let normalized = host.to_ascii_lowercase();
        if self.allow_domains.contains(&normalized) {
            return Ok(());
        }
        Err(GuardError::NetworkBlocked {
            host: normalized,
        })
    }

    /// Checks a subprocess spawn attempt against the guard policy.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::SubprocessBlocked`] while offline.
    pub fn check_subprocess(&self, program: &str) -> Result<(), GuardError> {
        if !self.offline() {
            return Ok(());
        }
        Err(GuardError::SubprocessBlocked {
            program: program.to_string(),
        })
    }

    /// Returns the environment contract exported to the child process.
    #[must_use]
    pub fn child_env(&self) -> Vec<(String, String)> {
        let mode = match self.mode {
            ReplayMode::Offline => "offline",
            ReplayMode::Online => "online",
        };
        let allow: Vec<&str> =
            self.allow_domains.iter().map(String::as_str).collect();
        vec![
            (ENV_REPLAY_MODE.to_string(), mode.to_string()),
            (ENV_NET_ALLOW.to_string(), allow.join(",")),
        ]
    }

    /// Wraps a gate error as a TOOLING violation at the given event index.
    #[must_use]
    pub fn violation(error: &GuardError, event_index: u64) -> Violation {
        Violation::new(
            codes::REPLAY_NETWORK_BLOCKED,
            FailureClass::Tooling,
            event_index,
            error.to_string(),
        )
        .with_hint("Run in online mode or allowlist the domain explicitly.")
    }
}

// ============================================================================
// SECTION: Host Classification
// ============================================================================

/// Reports whether a host is loopback (always permitted).
fn is_loopback(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    // Bare addresses parse directly; bracketed IPv6 goes through Host.
    if let Ok(addr) = host.parse::<IpAddr>() {
        return addr.is_loopback();
    }
    match Host::parse(host) {
        Ok(Host::Ipv4(addr)) => IpAddr::V4(addr).is_loopback(),
        Ok(Host::Ipv6(addr)) => IpAddr::V6(addr).is_loopback(),
        Ok(Host::Domain(_)) | Err(_) => false,
    }
}
