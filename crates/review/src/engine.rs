//! Review engine (§4.5): validates and records one reviewer's decision.

use chrono::{Duration, Utc};
use slb_common::{EngineError, RequestId, SessionId};
use slb_config::ReviewConfig;
use slb_store::{
    model::{Decision, Request, RequestStatus, Review},
    Repository, SubmitReviewOutcome,
};

use crate::{policy::decide_fn, signature};

/// Input to [`submit_review`].
pub struct SubmitReview<'a> {
    pub session_id: SessionId,
    pub session_key: &'a str,
    pub request_id: RequestId,
    pub decision: &'a str,
    pub comments: Option<String>,
}

/// Outcome of [`submit_review`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewResult {
    Recorded { approvals: u32, rejections: u32, new_status: Option<RequestStatus> },
    /// A concurrent writer already moved the request off `pending`; the
    /// caller may retry.
    Conflict,
}

/// Validate and record a review (§4.5). Preconditions are checked in order;
/// the first failure short-circuits with the matching [`EngineError`].
pub async fn submit_review(repo: &dyn Repository, config: &ReviewConfig, input: SubmitReview<'_>) -> Result<ReviewResult, EngineError> {
    if input.session_key.trim().is_empty() {
        return Err(EngineError::MissingSessionKey);
    }
    let decision: Decision = input.decision.parse().map_err(|_| EngineError::InvalidDecision)?;

    let session = repo
        .get_session(input.session_id)
        .await
        .map_err(to_engine_error)?
        .ok_or(EngineError::SessionNotFound)?;
    if !session.is_active() {
        return Err(EngineError::SessionInactive);
    }

    if !constant_time_str_eq(&session.session_key, input.session_key) {
        return Err(EngineError::SessionKeyMismatch);
    }

    let request = repo
        .get_request(input.request_id)
        .await
        .map_err(to_engine_error)?
        .ok_or(EngineError::RequestNotFound)?;
    if request.status != RequestStatus::Pending {
        return Err(EngineError::RequestNotPending);
    }

    if input.session_id == request.requestor_session_id {
        check_self_review(config, &request, &session.agent)?;
    }

    if repo
        .has_reviewer_reviewed(input.request_id, input.session_id)
        .await
        .map_err(to_engine_error)?
    {
        return Err(EngineError::AlreadyReviewed);
    }

    if decision == Decision::Approve
        && request.require_different_model
        && session.model == request.requestor_model
    {
        return Err(EngineError::RequireDifferentModel);
    }

    let now = Utc::now();
    let sig = signature::sign(&session.session_key, input.request_id, decision, now);
    let review = Review {
        id: slb_common::ReviewId::new(),
        request_id: input.request_id,
        reviewer_session_id: input.session_id,
        reviewer_agent: session.agent,
        reviewer_model: session.model,
        decision,
        comments: input.comments,
        signature: sig,
        signature_timestamp: now,
        created_at: now,
    };

    let outcome = repo
        .try_submit_review(&review, RequestStatus::Pending, request.min_approvals, decide_fn(config.conflict_resolution))
        .await
        .map_err(to_engine_error)?;

    match outcome {
        SubmitReviewOutcome::AlreadyReviewed => Err(EngineError::AlreadyReviewed),
        SubmitReviewOutcome::Recorded { approvals, rejections, new_status } => {
            Ok(ReviewResult::Recorded { approvals, rejections, new_status })
        },
        SubmitReviewOutcome::CasConflict { .. } => Ok(ReviewResult::Conflict),
    }
}

fn check_self_review(config: &ReviewConfig, request: &Request, agent: &str) -> Result<(), EngineError> {
    let trusted = config.trusted_self_approve.iter().any(|a| a == agent);
    let delay_elapsed = Utc::now() - request.created_at >= Duration::minutes(config.trusted_self_approve_delay_minutes as i64);
    if trusted && delay_elapsed { Ok(()) } else { Err(EngineError::SelfReview) }
}

fn constant_time_str_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn to_engine_error(err: slb_common::Error) -> EngineError {
    EngineError::Other(err.to_string())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use slb_common::RiskTier;
    use slb_store::{
        model::{CommandSpec, Justification, Session},
        SqliteRepository,
    };

    use super::*;

    async fn repo() -> SqliteRepository {
        SqliteRepository::new("sqlite::memory:").await.unwrap()
    }

    async fn session(repo: &SqliteRepository, agent: &str, model: &str, key: &str) -> SessionId {
        let s = Session {
            id: SessionId::new(),
            agent: agent.to_string(),
            program: "cli".to_string(),
            model: model.to_string(),
            project_path: "/proj".to_string(),
            session_key: key.to_string(),
            created_at: Utc::now(),
            last_active_at: Utc::now(),
            ended_at: None,
        };
        repo.create_session(&s).await.unwrap();
        s.id
    }

    fn request(requestor: SessionId, tier: RiskTier, min_approvals: u32, require_different_model: bool) -> Request {
        Request {
            id: RequestId::new(),
            project_path: "/proj".to_string(),
            requestor_session_id: requestor,
            requestor_agent: "agent-a".to_string(),
            requestor_model: "gpt".to_string(),
            risk_tier: tier,
            min_approvals,
            require_different_model,
            command: CommandSpec {
                raw: "rm -rf /tmp".to_string(),
                argv: None,
                cwd: "/proj".to_string(),
                shell: false,
                display_redacted: "rm -rf /tmp".to_string(),
                contains_sensitive: false,
                hash: "deadbeef".to_string(),
            },
            justification: Justification::default(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
            approval_expires_at: None,
            resolved_at: None,
            execution: None,
            rollback_path: None,
        }
    }

    #[tokio::test]
    async fn approval_reaching_threshold_advances_status() {
        let repo = repo().await;
        let requestor = session(&repo, "agent-a", "gpt", "rk").await;
        let reviewer = session(&repo, "agent-b", "claude", "vk").await;
        let req = request(requestor, RiskTier::Dangerous, 1, false);
        repo.create_request(&req).await.unwrap();

        let cfg = ReviewConfig::default();
        let result = submit_review(
            &repo,
            &cfg,
            SubmitReview { session_id: reviewer, session_key: "vk", request_id: req.id, decision: "approve", comments: None },
        )
        .await
        .unwrap();

        assert_eq!(result, ReviewResult::Recorded { approvals: 1, rejections: 0, new_status: Some(RequestStatus::Approved) });
    }

    #[tokio::test]
    async fn wrong_session_key_is_rejected() {
        let repo = repo().await;
        let requestor = session(&repo, "agent-a", "gpt", "rk").await;
        let reviewer = session(&repo, "agent-b", "claude", "vk").await;
        let req = request(requestor, RiskTier::Dangerous, 1, false);
        repo.create_request(&req).await.unwrap();

        let cfg = ReviewConfig::default();
        let result = submit_review(
            &repo,
            &cfg,
            SubmitReview { session_id: reviewer, session_key: "wrong", request_id: req.id, decision: "approve", comments: None },
        )
        .await;
        assert_eq!(result, Err(EngineError::SessionKeyMismatch));
    }

    #[tokio::test]
    async fn self_review_is_blocked_without_trust() {
        let repo = repo().await;
        let requestor = session(&repo, "agent-a", "gpt", "rk").await;
        let req = request(requestor, RiskTier::Dangerous, 1, false);
        repo.create_request(&req).await.unwrap();

        let cfg = ReviewConfig::default();
        let result = submit_review(
            &repo,
            &cfg,
            SubmitReview { session_id: requestor, session_key: "rk", request_id: req.id, decision: "approve", comments: None },
        )
        .await;
        assert_eq!(result, Err(EngineError::SelfReview));
    }

    #[tokio::test]
    async fn same_model_cannot_approve_critical_require_diff_model() {
        let repo = repo().await;
        let requestor = session(&repo, "agent-a", "gpt", "rk").await;
        let reviewer = session(&repo, "agent-b", "gpt", "vk").await;
        let req = request(requestor, RiskTier::Critical, 2, true);
        repo.create_request(&req).await.unwrap();

        let cfg = ReviewConfig::default();
        let result = submit_review(
            &repo,
            &cfg,
            SubmitReview { session_id: reviewer, session_key: "vk", request_id: req.id, decision: "approve", comments: None },
        )
        .await;
        assert_eq!(result, Err(EngineError::RequireDifferentModel));
    }

    #[tokio::test]
    async fn duplicate_review_is_rejected() {
        let repo = repo().await;
        let requestor = session(&repo, "agent-a", "gpt", "rk").await;
        let reviewer = session(&repo, "agent-b", "claude", "vk").await;
        let req = request(requestor, RiskTier::Dangerous, 2, false);
        repo.create_request(&req).await.unwrap();

        let cfg = ReviewConfig::default();
        submit_review(
            &repo,
            &cfg,
            SubmitReview { session_id: reviewer, session_key: "vk", request_id: req.id, decision: "approve", comments: None },
        )
        .await
        .unwrap();

        let result = submit_review(
            &repo,
            &cfg,
            SubmitReview { session_id: reviewer, session_key: "vk", request_id: req.id, decision: "approve", comments: None },
        )
        .await;
        assert_eq!(result, Err(EngineError::AlreadyReviewed));
    }
}
