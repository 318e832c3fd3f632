//! The repository contract consumed by every core component (§6).
//!
//! Implementations are the storage layer; this module only defines the
//! contract. Status updates support compare-and-set using an
//! expected-previous-status, which is the sole correctness mechanism
//! preventing split-brain between concurrent reviewers and concurrent
//! executors (§9 design note) — it is not optional.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slb_common::{RequestId, Result, SessionId};

use crate::model::{Execution, Request, RequestStatus, Review, Session};

/// Pure decision function used inside [`Repository::try_submit_review`]'s
/// transaction: given the committed approval/rejection counts and the
/// request's `min_approvals`, decide the request's new status (or `None` if
/// nothing changes). Conflict-resolution policies (§4.5) are expressed as
/// values of this type so the decision runs inside the same transaction that
/// counts the reviews, without requiring a generic transaction combinator
/// over the trait object.
pub type DecideFn = fn(approvals: u32, rejections: u32, min_approvals: u32) -> Option<RequestStatus>;

/// Outcome of [`Repository::try_submit_review`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitReviewOutcome {
    /// This session already reviewed this request; nothing was inserted.
    AlreadyReviewed,
    /// The review was recorded. `new_status` is set if the request's status
    /// advanced as a result (`None` means the policy left it unchanged).
    Recorded {
        approvals: u32,
        rejections: u32,
        new_status: Option<RequestStatus>,
    },
    /// The review was recorded but a concurrent status change meant the
    /// optimistic-lock compare-and-set on `expected_status` did not apply;
    /// the caller may retry or surface an invalid-transition error.
    CasConflict { approvals: u32, rejections: u32 },
}

/// Transactional accessors consumed by the classifier/requests/review/
/// executor/rollback components.
#[async_trait]
pub trait Repository: Send + Sync {
    // Sessions.
    async fn create_session(&self, session: &Session) -> Result<()>;
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>>;
    async fn end_session(&self, id: SessionId) -> Result<()>;
    async fn list_active_sessions(&self, project_path: &str) -> Result<Vec<Session>>;
    /// `true` iff an active session in `project_path` has a model different
    /// from `excluding_model`.
    async fn different_model_exists(&self, project_path: &str, excluding_model: &str)
    -> Result<bool>;

    // Requests.
    async fn create_request(&self, request: &Request) -> Result<()>;
    async fn get_request(&self, id: RequestId) -> Result<Option<Request>>;
    async fn list_pending_requests(&self, project_path: &str) -> Result<Vec<Request>>;
    /// All requests with `status = pending` and `require_different_model =
    /// true`, across all projects — input to the escalation sweeper (§4.5).
    async fn list_pending_requiring_different_model(&self) -> Result<Vec<Request>>;
    /// Compare-and-set status transition. Returns `true` if the update
    /// applied, `false` if `expected` did not match the stored status.
    async fn update_status(
        &self,
        id: RequestId,
        expected: RequestStatus,
        new: RequestStatus,
        resolved_at: Option<DateTime<Utc>>,
        approval_expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;
    async fn update_execution(&self, id: RequestId, execution: &Execution) -> Result<()>;
    async fn set_rollback_path(&self, id: RequestId, path: &str) -> Result<()>;

    // Reviews.
    async fn has_reviewer_reviewed(&self, request_id: RequestId, session_id: SessionId)
    -> Result<bool>;
    async fn list_reviews_for_request(&self, request_id: RequestId) -> Result<Vec<Review>>;
    async fn count_by_decision(&self, request_id: RequestId) -> Result<(u32, u32)>;
    /// Inside one transaction: re-check no duplicate review for
    /// (request_id, reviewer_session_id), insert the review, count
    /// approvals/rejections, run `decide`, and if it yields a new status,
    /// attempt the compare-and-set against `expected_status`.
    async fn try_submit_review(
        &self,
        review: &Review,
        expected_status: RequestStatus,
        min_approvals: u32,
        decide: DecideFn,
    ) -> Result<SubmitReviewOutcome>;
}
