//! Configuration validation.
//!
//! Rejects configs whose knobs are structurally nonsensical before they ever
//! reach the engine (an out-of-range TTL, an empty conflict-resolution
//! choice, a negative dynamic-quorum floor can't be represented once parsed
//! into `SlbConfig`, so this mostly guards cross-field invariants).

use crate::schema::SlbConfig;

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate `config`, returning every diagnostic found (empty = valid).
#[must_use]
pub fn validate(config: &SlbConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.approval.ttl_minutes == 0 {
        diagnostics.push(Diagnostic {
            path: "approval.ttl_minutes",
            message: "must be greater than zero".to_string(),
        });
    }
    if config.approval.ttl_critical_minutes == 0 {
        diagnostics.push(Diagnostic {
            path: "approval.ttl_critical_minutes",
            message: "must be greater than zero".to_string(),
        });
    }
    if config.request.ttl_minutes == 0 {
        diagnostics.push(Diagnostic {
            path: "request.ttl_minutes",
            message: "must be greater than zero".to_string(),
        });
    }
    if config.execution.default_timeout_seconds == 0 {
        diagnostics.push(Diagnostic {
            path: "execution.default_timeout_seconds",
            message: "must be greater than zero".to_string(),
        });
    }
    if config.execution.log_dir.trim().is_empty() {
        diagnostics.push(Diagnostic {
            path: "execution.log_dir",
            message: "must not be empty".to_string(),
        });
    }

    diagnostics
}
