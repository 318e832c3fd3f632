//! Request state machine (§4.3).

use chrono::{DateTime, Duration, Utc};
use slb_common::EngineError;
use slb_config::ApprovalConfig;
use slb_store::model::RequestStatus;

/// Allowed destinations for `from`. An empty slice means `from` is terminal.
#[must_use]
pub fn allowed_destinations(from: RequestStatus) -> &'static [RequestStatus] {
    use RequestStatus::{Approved, Cancelled, Escalated, Executed, ExecutionFailed, Executing, Pending, Rejected, TimedOut, Timeout};
    match from {
        Pending => &[Approved, Rejected, Cancelled, Timeout],
        Approved => &[Executing, Cancelled],
        Executing => &[Executed, ExecutionFailed, TimedOut],
        Timeout => &[Escalated],
        Rejected | Cancelled | Escalated | Executed | ExecutionFailed | TimedOut => &[],
    }
}

/// Validate that `from -> to` is a legal transition.
pub fn validate_transition(from: RequestStatus, to: RequestStatus) -> Result<(), EngineError> {
    if allowed_destinations(from).contains(&to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from: from.as_str().to_string(), to: to.as_str().to_string() })
    }
}

/// The approval window for a request of the given risk tier: 10 minutes for
/// critical, 30 minutes otherwise (§4.3).
#[must_use]
pub fn approval_ttl(tier: slb_common::RiskTier, cfg: &ApprovalConfig) -> Duration {
    if tier == slb_common::RiskTier::Critical {
        Duration::minutes(cfg.ttl_critical_minutes as i64)
    } else {
        Duration::minutes(cfg.ttl_minutes as i64)
    }
}

/// Outcome of a transition attempt. `Conflict` means the optimistic lock
/// failed because another writer already moved the request off `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Conflict,
}

/// Compute the `resolved_at`/`approval_expires_at` pair a transition into
/// `to` should persist, given the request's current tier and `now`.
#[must_use]
pub fn transition_timestamps(
    to: RequestStatus,
    tier: slb_common::RiskTier,
    cfg: &ApprovalConfig,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let resolved_at = to.is_terminal().then_some(now);
    let approval_expires_at = (to == RequestStatus::Approved).then(|| now + approval_ttl(tier, cfg));
    (resolved_at, approval_expires_at)
}
