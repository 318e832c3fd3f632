//! Ordered pre-execution gates (§4.6 G1-G5). G6, the optimistic
//! approved→executing transition, is performed by [`crate::execute_approved`]
//! itself since it is the one gate that mutates state.

use slb_classifier::PatternEngine;
use slb_common::{EngineError, RequestId, RiskTier, SessionId};
use slb_normalizer::normalize;
use slb_requests::command_hash;
use slb_store::{
    model::{Request, RequestStatus},
    Repository,
};

/// Run gates G1-G5 against the stored request and session, returning the
/// validated request on success.
pub async fn check_gates(
    repo: &dyn Repository,
    classifier: &PatternEngine,
    request_id: RequestId,
    session_id: SessionId,
) -> Result<Request, EngineError> {
    // G1: request and session exist.
    let request = repo.get_request(request_id).await.map_err(other)?.ok_or(EngineError::RequestNotFound)?;
    let session = repo.get_session(session_id).await.map_err(other)?.ok_or(EngineError::SessionNotFound)?;
    if !session.is_active() {
        return Err(EngineError::SessionInactive);
    }

    // G2: status must be approved; already-executing/executed are distinct
    // errors from the generic not-approved case.
    match request.status {
        RequestStatus::Executing => return Err(EngineError::AlreadyExecuting),
        RequestStatus::Executed | RequestStatus::ExecutionFailed => return Err(EngineError::AlreadyExecuted),
        RequestStatus::Approved => {},
        _ => return Err(EngineError::RequestNotApproved),
    }

    // G3: approval window still open.
    let expires = request.approval_expires_at.ok_or(EngineError::ApprovalExpired)?;
    if expires < chrono::Utc::now() {
        return Err(EngineError::ApprovalExpired);
    }

    // G4: command has not changed since approval.
    let recomputed = command_hash(&request.command.raw, request.command.argv.as_deref(), &request.command.cwd, request.command.shell);
    if recomputed != request.command.hash {
        return Err(EngineError::HashMismatch);
    }

    // G5: re-classification must not exceed the approved tier.
    let normalized = normalize(&request.command.raw, Some(&request.command.cwd));
    let classification = slb_classifier::classify(classifier, &normalized);
    if tier_rank(classification.tier) > tier_rank(request.risk_tier) {
        return Err(EngineError::TierEscalated);
    }

    Ok(request)
}

fn tier_rank(tier: RiskTier) -> u8 {
    match tier {
        RiskTier::Safe => 0,
        RiskTier::Caution => 1,
        RiskTier::Dangerous => 2,
        RiskTier::Critical => 3,
    }
}

fn other(err: slb_common::Error) -> EngineError {
    EngineError::Other(err.to_string())
}
