//! Entities and invariants of the control plane's data model (§3).
//!
//! Timestamps are UTC. Nullable time fields (`approval_expires_at`,
//! `resolved_at`, `executed_at`, `exit_code`, `duration_ms`) are modeled as
//! `Option`, never sentinel zero values — zero is a legitimate exit code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slb_common::{RequestId, ReviewId, RiskTier, SessionId};

/// An active agent attached to a project.
///
/// A session is active iff `ended_at` is `None`. Only active sessions may
/// submit requests or reviews. `session_key` is known only to the holder and
/// the store; it must never be logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub agent: String,
    pub program: String,
    pub model: String,
    pub project_path: String,
    pub session_key: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// The command to be approved.
///
/// `hash = H(canonical(raw, argv, cwd, shell))`. Any modification to
/// raw/argv/cwd/shell between approval and execution must fail hash
/// verification (Testable Property 7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub raw: String,
    pub argv: Option<Vec<String>>,
    pub cwd: String,
    pub shell: bool,
    pub display_redacted: String,
    pub contains_sensitive: bool,
    pub hash: String,
}

/// Free-text justification, preserved verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Justification {
    pub reason: String,
    pub expected_effect: String,
    pub goal: String,
    pub safety_argument: String,
}

/// Status of a [`Request`]. Transitions are governed exclusively by the
/// table in §4.3 — never mutate this field directly outside the state
/// machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Timeout,
    Escalated,
    Executing,
    Executed,
    ExecutionFailed,
    TimedOut,
}

impl RequestStatus {
    /// Terminal statuses freeze `resolved_at` and forbid further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Executed
                | Self::ExecutionFailed
                | Self::TimedOut
                | Self::Cancelled
                | Self::Rejected
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Escalated => "escalated",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::ExecutionFailed => "execution_failed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            "timeout" => Ok(Self::Timeout),
            "escalated" => Ok(Self::Escalated),
            "executing" => Ok(Self::Executing),
            "executed" => Ok(Self::Executed),
            "execution_failed" => Ok(Self::ExecutionFailed),
            "timed_out" => Ok(Self::TimedOut),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running an approved command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub executed_at: DateTime<Utc>,
    pub executed_by_session_id: SessionId,
    pub executed_by_agent: String,
    pub executed_by_model: String,
    pub log_path: String,
    pub exit_code: Option<i32>,
    pub duration_ms: Option<i64>,
}

/// One command awaiting or having completed review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub project_path: String,
    pub requestor_session_id: SessionId,
    pub requestor_agent: String,
    pub requestor_model: String,
    pub risk_tier: RiskTier,
    pub min_approvals: u32,
    pub require_different_model: bool,
    pub command: CommandSpec,
    pub justification: Justification,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub approval_expires_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub execution: Option<Execution>,
    pub rollback_path: Option<String>,
}

/// A reviewer's decision on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// One reviewer's signed decision on one request.
///
/// `signature = HMAC(session_key, request_id ∥ decision ∥
/// signature_timestamp)`, verifiable without storing the key anywhere but in
/// [`Session`]. At most one review per (request_id, reviewer_session_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub request_id: RequestId,
    pub reviewer_session_id: SessionId,
    pub reviewer_agent: String,
    pub reviewer_model: String,
    pub decision: Decision,
    pub comments: Option<String>,
    pub signature: String,
    pub signature_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A snapshot taken before a destructive command, tagged by kind. Never a
/// heterogeneous mapping type — one payload per variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RollbackData {
    Filesystem(FilesystemRollback),
    Git(GitRollback),
    Kubernetes(KubernetesRollback),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRoot {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemRollback {
    pub roots: Vec<RollbackRoot>,
    pub archive_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRollback {
    pub repo_root: String,
    pub head: String,
    pub branch: Option<String>,
    pub diff_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesManifest {
    pub kind: String,
    pub name: String,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesRollback {
    pub namespace: String,
    pub manifests: Vec<KubernetesManifest>,
}

/// Descriptor written as `metadata.json` at the root of a rollback directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackMetadata {
    pub request_id: RequestId,
    pub project_path: String,
    #[serde(flatten)]
    pub data: RollbackData,
}
