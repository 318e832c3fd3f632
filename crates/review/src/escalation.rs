//! Different-model escalation sweeper (§4.5): periodically advances pending
//! requests that still require a second model and have waited too long.

use chrono::{Duration, Utc};
use slb_common::Error;
use slb_config::ReviewConfig;
use slb_store::{model::RequestStatus, Repository};
use tracing::info;

/// One sweep outcome per inspected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Escalated,
    TimeUntilEscalation(Duration),
}

/// Inspect every pending request with `require_different_model` and
/// escalate (pending → timeout → escalated) the ones that have waited past
/// `different_model_timeout` with no qualifying reviewer available.
pub async fn run_escalation_sweep(repo: &dyn Repository, config: &ReviewConfig) -> Result<Vec<SweepOutcome>, Error> {
    let timeout = Duration::minutes(config.different_model_timeout_minutes as i64);
    let now = Utc::now();
    let mut outcomes = Vec::new();

    for request in repo.list_pending_requiring_different_model().await? {
        let has_other_model = repo.different_model_exists(&request.project_path, &request.requestor_model).await?;
        let waited = now - request.created_at;

        if !has_other_model && waited >= timeout {
            let advanced_to_timeout = repo
                .update_status(request.id, RequestStatus::Pending, RequestStatus::Timeout, None, None)
                .await?;
            if advanced_to_timeout {
                repo.update_status(request.id, RequestStatus::Timeout, RequestStatus::Escalated, None, None).await?;
                info!(request_id = %request.id, "request escalated after different-model timeout");
                outcomes.push(SweepOutcome::Escalated);
            }
        } else if !has_other_model {
            outcomes.push(SweepOutcome::TimeUntilEscalation(timeout - waited));
        }
    }

    Ok(outcomes)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use slb_common::{RequestId, RiskTier, SessionId};
    use slb_store::{
        model::{CommandSpec, Justification, Request, Session},
        SqliteRepository,
    };

    use super::*;

    async fn repo() -> SqliteRepository {
        SqliteRepository::new("sqlite::memory:").await.unwrap()
    }

    fn stale_request(requestor: SessionId, created_at: chrono::DateTime<Utc>) -> Request {
        Request {
            id: RequestId::new(),
            project_path: "/proj".to_string(),
            requestor_session_id: requestor,
            requestor_agent: "agent-a".to_string(),
            requestor_model: "gpt".to_string(),
            risk_tier: RiskTier::Critical,
            min_approvals: 2,
            require_different_model: true,
            command: CommandSpec {
                raw: "DROP DATABASE prod".to_string(),
                argv: None,
                cwd: "/proj".to_string(),
                shell: false,
                display_redacted: "DROP DATABASE prod".to_string(),
                contains_sensitive: false,
                hash: "h".to_string(),
            },
            justification: Justification::default(),
            status: RequestStatus::Pending,
            created_at,
            expires_at: created_at + Duration::hours(1),
            approval_expires_at: None,
            resolved_at: None,
            execution: None,
            rollback_path: None,
        }
    }

    #[tokio::test]
    async fn escalates_when_no_other_model_and_timeout_elapsed() {
        let repo = repo().await;
        let requestor_id = SessionId::new();
        let session = Session {
            id: requestor_id,
            agent: "agent-a".to_string(),
            program: "cli".to_string(),
            model: "gpt".to_string(),
            project_path: "/proj".to_string(),
            session_key: "k".to_string(),
            created_at: Utc::now(),
            last_active_at: Utc::now(),
            ended_at: None,
        };
        repo.create_session(&session).await.unwrap();

        let stale = stale_request(requestor_id, Utc::now() - Duration::minutes(10));
        repo.create_request(&stale).await.unwrap();

        let cfg = ReviewConfig::default();
        let outcomes = run_escalation_sweep(&repo, &cfg).await.unwrap();
        assert_eq!(outcomes, vec![SweepOutcome::Escalated]);

        let refreshed = repo.get_request(stale.id).await.unwrap().unwrap();
        assert_eq!(refreshed.status, RequestStatus::Escalated);
    }

    #[tokio::test]
    async fn reports_time_remaining_when_not_yet_due() {
        let repo = repo().await;
        let requestor_id = SessionId::new();
        let session = Session {
            id: requestor_id,
            agent: "agent-a".to_string(),
            program: "cli".to_string(),
            model: "gpt".to_string(),
            project_path: "/proj".to_string(),
            session_key: "k".to_string(),
            created_at: Utc::now(),
            last_active_at: Utc::now(),
            ended_at: None,
        };
        repo.create_session(&session).await.unwrap();

        let fresh = stale_request(requestor_id, Utc::now());
        repo.create_request(&fresh).await.unwrap();

        let cfg = ReviewConfig::default();
        let outcomes = run_escalation_sweep(&repo, &cfg).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], SweepOutcome::TimeUntilEscalation(_)));
    }
}
