use thiserror::Error;

/// Stable, symbolic error kinds surfaced across the control plane (§7 of the
/// design). Callers match on the variant, never on the message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("session is not active")]
    SessionInactive,
    #[error("session not found")]
    SessionNotFound,
    #[error("session key does not match")]
    SessionKeyMismatch,
    #[error("session key is required")]
    MissingSessionKey,
    #[error("decision must be approve or reject")]
    InvalidDecision,
    #[error("a session may not review its own request")]
    SelfReview,
    #[error("this session has already reviewed this request")]
    AlreadyReviewed,
    #[error("an approving review must come from a session running a different model")]
    RequireDifferentModel,
    #[error("request is not pending")]
    RequestNotPending,
    #[error("request is not approved")]
    RequestNotApproved,
    #[error("request not found")]
    RequestNotFound,
    #[error("approval window has expired")]
    ApprovalExpired,
    #[error("command hash does not match the approved command")]
    HashMismatch,
    #[error("command now classifies to a higher risk tier than was approved")]
    TierEscalated,
    #[error("request is already executing")]
    AlreadyExecuting,
    #[error("request has already executed")]
    AlreadyExecuted,
    #[error("execution exceeded its deadline")]
    ExecutionTimeout,
    #[error("transition from {from} to {to} is not legal")]
    InvalidTransition { from: String, to: String },
    #[error("rollback snapshot exceeds the configured size limit")]
    RollbackSizeExceeded,
    #[error("rollback target(s) do not exist")]
    RollbackTargetsMissing,
    #[error("rollback kind is not supported")]
    RollbackUnsupportedKind,
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// The stable symbolic name, e.g. for logging or client-facing codes.
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::SessionInactive => "SESSION_INACTIVE",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::SessionKeyMismatch => "SESSION_KEY_MISMATCH",
            Self::MissingSessionKey => "MISSING_SESSION_KEY",
            Self::InvalidDecision => "INVALID_DECISION",
            Self::SelfReview => "SELF_REVIEW",
            Self::AlreadyReviewed => "ALREADY_REVIEWED",
            Self::RequireDifferentModel => "REQUIRE_DIFF_MODEL",
            Self::RequestNotPending => "REQUEST_NOT_PENDING",
            Self::RequestNotApproved => "REQUEST_NOT_APPROVED",
            Self::RequestNotFound => "REQUEST_NOT_FOUND",
            Self::ApprovalExpired => "APPROVAL_EXPIRED",
            Self::HashMismatch => "HASH_MISMATCH",
            Self::TierEscalated => "TIER_ESCALATED",
            Self::AlreadyExecuting => "ALREADY_EXECUTING",
            Self::AlreadyExecuted => "ALREADY_EXECUTED",
            Self::ExecutionTimeout => "EXECUTION_TIMEOUT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::RollbackSizeExceeded => "ROLLBACK_SIZE_EXCEEDED",
            Self::RollbackTargetsMissing => "ROLLBACK_TARGETS_MISSING",
            Self::RollbackUnsupportedKind => "ROLLBACK_UNSUPPORTED_KIND",
            Self::Other(_) => "OTHER",
        }
    }
}
