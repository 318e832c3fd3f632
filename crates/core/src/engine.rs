//! Facade wiring the classifier, request/review/executor/rollback
//! components, and the notification collaborator into one handle.

use std::{sync::Arc, time::Duration};

use slb_classifier::PatternEngine;
use slb_common::{EngineError, RequestId};
use slb_config::SlbConfig;
use slb_executor::{execute_approved, ExecuteApproved, ExecutionResult};
use slb_notify::Notifier;
use slb_requests::{create_request, CreateOutcome, NewCommand, Redactor};
use slb_review::{run_escalation_sweep, submit_review, ReviewResult, SubmitReview};
use slb_store::{model::RequestStatus, Repository};
use tracing::warn;

/// The control plane, assembled once at startup and shared across request
/// handlers.
pub struct Engine {
    pub repo: Arc<dyn Repository>,
    pub classifier: Arc<PatternEngine>,
    pub config: Arc<SlbConfig>,
    pub redactor: Arc<Redactor>,
    pub notifier: Arc<dyn Notifier>,
}

impl Engine {
    #[must_use]
    pub fn new(repo: Arc<dyn Repository>, classifier: Arc<PatternEngine>, config: Arc<SlbConfig>, notifier: Arc<dyn Notifier>) -> Self {
        let redactor = Arc::new(Redactor::default());
        Self { repo, classifier, config, redactor, notifier }
    }

    /// Submit a raw command for classification and, if needed, review
    /// (§4.4).
    pub async fn submit_command(&self, input: NewCommand<'_>) -> Result<CreateOutcome, slb_common::Error> {
        let outcome = create_request(self.repo.as_ref(), &self.classifier, &self.redactor, &self.config, input).await?;
        if let CreateOutcome::Created(request) = &outcome {
            let notifier = Arc::clone(&self.notifier);
            let request = request.clone();
            if let Err(err) = notifier.new_request(&request).await {
                warn!(request_id = %request.id, error = %err, "new_request notification failed");
            }
        }
        Ok(outcome)
    }

    /// Submit a signed review (§4.5). Notifies collaborators best-effort
    /// when the request resolves to approved or rejected.
    pub async fn submit_review(&self, input: SubmitReview<'_>) -> Result<ReviewResult, EngineError> {
        let request_id = input.request_id;
        let outcome = submit_review(self.repo.as_ref(), &self.config.review, input).await?;
        if let ReviewResult::Recorded { new_status: Some(status), .. } = &outcome {
            self.notify_resolution(request_id, *status).await;
        }
        Ok(outcome)
    }

    /// Run the approved command (§4.6). Notifies collaborators best-effort
    /// once execution completes.
    pub async fn execute(&self, input: ExecuteApproved) -> Result<ExecutionResult, EngineError> {
        let request_id = input.request_id;
        let result = execute_approved(self.repo.as_ref(), &self.classifier, &self.config, input).await?;
        if !result.timed_out && !result.cancelled {
            self.notify_executed(request_id).await;
        }
        Ok(result)
    }

    async fn notify_resolution(&self, request_id: RequestId, status: RequestStatus) {
        let Ok(Some(request)) = self.repo.get_request(request_id).await else { return };
        let outcome = match status {
            RequestStatus::Approved => self.notifier.approved(&request).await,
            RequestStatus::Rejected => self.notifier.rejected(&request).await,
            _ => return,
        };
        if let Err(err) = outcome {
            warn!(request_id = %request_id, error = %err, "resolution notification failed");
        }
    }

    async fn notify_executed(&self, request_id: RequestId) {
        let Ok(Some(request)) = self.repo.get_request(request_id).await else { return };
        let Some(execution) = request.execution.clone() else { return };
        if let Err(err) = self.notifier.executed(&request, &execution).await {
            warn!(request_id = %request_id, error = %err, "executed notification failed");
        }
    }
}

/// Spawn the background sweeper that escalates pending, different-model
/// requests whose timeout has elapsed (§4.5). Returns a handle the caller
/// may abort on shutdown.
pub fn spawn_escalation_sweeper(engine: Arc<Engine>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match run_escalation_sweep(engine.repo.as_ref(), &engine.config.review).await {
                Ok(outcomes) => {
                    let escalated = outcomes.iter().filter(|o| matches!(o, slb_review::SweepOutcome::Escalated)).count();
                    if escalated > 0 {
                        tracing::info!(escalated, "escalation sweep advanced requests");
                    }
                },
                Err(err) => warn!(error = %err, "escalation sweep failed"),
            }
        }
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use chrono::Utc;
    use slb_common::SessionId;
    use slb_notify::NoopNotifier;
    use slb_store::{model::Session, SqliteRepository};

    use super::*;

    async fn test_engine() -> (Arc<Engine>, SessionId) {
        let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::new("sqlite::memory:").await.unwrap());
        let session = Session {
            id: SessionId::new(),
            agent: "agent-a".to_string(),
            program: "cli".to_string(),
            model: "gpt".to_string(),
            project_path: "/proj".to_string(),
            session_key: "key".to_string(),
            created_at: Utc::now(),
            last_active_at: Utc::now(),
            ended_at: None,
        };
        repo.create_session(&session).await.unwrap();
        let engine = Engine::new(repo, Arc::new(PatternEngine::new().unwrap()), Arc::new(SlbConfig::default()), Arc::new(NoopNotifier));
        (Arc::new(engine), session.id)
    }

    #[tokio::test]
    async fn submitting_a_dangerous_command_creates_a_pending_request() {
        let (engine, session_id) = test_engine().await;
        let outcome = engine
            .submit_command(NewCommand {
                session_id,
                command_raw: "rm -rf /tmp/build",
                cwd: "/proj",
                justification: slb_store::model::Justification::default(),
            })
            .await
            .unwrap();
        match outcome {
            CreateOutcome::Created(request) => assert_eq!(request.status, RequestStatus::Pending),
            CreateOutcome::Skipped => panic!("expected a created request"),
        }
    }

    #[tokio::test]
    async fn submitting_a_safe_command_is_skipped() {
        let (engine, session_id) = test_engine().await;
        let outcome = engine
            .submit_command(NewCommand { session_id, command_raw: "ls -la", cwd: "/proj", justification: slb_store::model::Justification::default() })
            .await
            .unwrap();
        assert!(matches!(outcome, CreateOutcome::Skipped));
    }
}
