//! Request creator (§4.4): turns a raw command string into a persisted,
//! pending [`Request`], or reports it needed no review at all.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use slb_classifier::PatternEngine;
use slb_common::{Error, RequestId, RiskTier, SessionId};
use slb_config::SlbConfig;
use slb_normalizer::normalize;
use slb_store::{
    model::{CommandSpec, Justification, Request, RequestStatus},
    Repository,
};

use crate::redaction::Redactor;

/// Outcome of [`create_request`].
pub enum CreateOutcome {
    /// A pending request was persisted.
    Created(Request),
    /// The command classified as safe and needs no review.
    Skipped,
}

/// Input the caller supplies for a new request; everything else is derived.
pub struct NewCommand<'a> {
    pub session_id: SessionId,
    pub command_raw: &'a str,
    pub cwd: &'a str,
    pub justification: Justification,
}

/// Create a request for `input`, or report it was skipped because it needs
/// no review (§4.4).
pub async fn create_request(
    repo: &dyn Repository,
    classifier: &PatternEngine,
    redactor: &Redactor,
    config: &SlbConfig,
    input: NewCommand<'_>,
) -> Result<CreateOutcome, Error> {
    if input.command_raw.trim().is_empty() {
        return Err(Error::message("command must be non-empty"));
    }

    let session = repo
        .get_session(input.session_id)
        .await?
        .ok_or_else(|| Error::message("session not found"))?;
    if !session.is_active() {
        return Err(Error::message("session is not active"));
    }
    if config.blocked_agents.iter().any(|a| a == &session.agent) {
        return Err(Error::message(format!("agent {} is blocked", session.agent)));
    }

    let (display_redacted, contains_sensitive) = redactor.redact(input.command_raw);

    let normalized = normalize(input.command_raw, Some(input.cwd));
    let classification = slb_classifier::classify(classifier, &normalized);

    if classification.is_safe && !classification.needs_approval {
        return Ok(CreateOutcome::Skipped);
    }

    let hash = command_hash(input.command_raw, None, input.cwd, false);
    let command = CommandSpec {
        raw: input.command_raw.to_string(),
        argv: None,
        cwd: input.cwd.to_string(),
        shell: false,
        display_redacted,
        contains_sensitive,
        hash,
    };

    let min_approvals = resolve_min_approvals(repo, config, &session.project_path, classification.tier, classification.min_approvals).await?;
    let require_different_model = classification.tier == RiskTier::Critical;

    let now = Utc::now();
    let request = Request {
        id: RequestId::new(),
        project_path: session.project_path,
        requestor_session_id: session.id,
        requestor_agent: session.agent,
        requestor_model: session.model,
        risk_tier: classification.tier,
        min_approvals,
        require_different_model,
        command,
        justification: input.justification,
        status: RequestStatus::Pending,
        created_at: now,
        expires_at: now + Duration::minutes(config.request.ttl_minutes as i64),
        approval_expires_at: None,
        resolved_at: None,
        execution: None,
        rollback_path: None,
    };

    repo.create_request(&request).await?;
    Ok(CreateOutcome::Created(request))
}

/// Resolve effective `min_approvals`: the tier's base (with any per-tier
/// config override), optionally tightened by dynamic quorum (§4.4).
async fn resolve_min_approvals(
    repo: &dyn Repository,
    config: &SlbConfig,
    project_path: &str,
    tier: RiskTier,
    classifier_min: u32,
) -> Result<u32, Error> {
    let configured = config
        .patterns
        .min_approvals
        .get(tier.as_str())
        .copied()
        .unwrap_or(classifier_min);

    if !config.dynamic_quorum.enabled {
        return Ok(configured);
    }

    let active = repo.list_active_sessions(project_path).await?.len() as u32;
    let floor = if tier == RiskTier::Critical { config.dynamic_quorum.floor.max(1) } else { config.dynamic_quorum.floor };
    let dynamic = active.saturating_sub(1).clamp(floor, configured.max(floor));
    Ok(dynamic.min(configured))
}

/// `H(canonical(raw, argv, cwd, shell))` — any change to these fields
/// between approval and execution fails hash verification (Testable
/// Property 7, §4.6 G4).
#[must_use]
pub fn command_hash(raw: &str, argv: Option<&[String]>, cwd: &str, shell: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hasher.update([0u8]);
    if let Some(argv) = argv {
        for arg in argv {
            hasher.update(arg.as_bytes());
            hasher.update([0u8]);
        }
    }
    hasher.update(cwd.as_bytes());
    hasher.update([0u8]);
    hasher.update([u8::from(shell)]);
    format!("{:x}", hasher.finalize())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use slb_store::SqliteRepository;

    use super::*;

    async fn repo() -> SqliteRepository {
        SqliteRepository::new("sqlite::memory:").await.unwrap()
    }

    async fn active_session(repo: &SqliteRepository, project: &str, model: &str) -> SessionId {
        let session = slb_store::model::Session {
            id: SessionId::new(),
            agent: "agent-a".to_string(),
            program: "cli".to_string(),
            model: model.to_string(),
            project_path: project.to_string(),
            session_key: "key".to_string(),
            created_at: Utc::now(),
            last_active_at: Utc::now(),
            ended_at: None,
        };
        repo.create_session(&session).await.unwrap();
        session.id
    }

    #[tokio::test]
    async fn safe_command_is_skipped() {
        let repo = repo().await;
        let sid = active_session(&repo, "/proj", "gpt").await;
        let classifier = PatternEngine::new().unwrap();
        let redactor = Redactor::default();
        let cfg = SlbConfig::default();

        let outcome = create_request(
            &repo,
            &classifier,
            &redactor,
            &cfg,
            NewCommand { session_id: sid, command_raw: "ls -la", cwd: "/proj", justification: Justification::default() },
        )
        .await
        .unwrap();
        assert!(matches!(outcome, CreateOutcome::Skipped));
    }

    #[tokio::test]
    async fn dangerous_command_is_created_pending() {
        let repo = repo().await;
        let sid = active_session(&repo, "/proj", "gpt").await;
        let classifier = PatternEngine::new().unwrap();
        let redactor = Redactor::default();
        let cfg = SlbConfig::default();

        let outcome = create_request(
            &repo,
            &classifier,
            &redactor,
            &cfg,
            NewCommand { session_id: sid, command_raw: "rm -rf /tmp/build", cwd: "/proj", justification: Justification::default() },
        )
        .await
        .unwrap();
        match outcome {
            CreateOutcome::Created(req) => {
                assert_eq!(req.status, RequestStatus::Pending);
                assert_eq!(req.risk_tier, RiskTier::Dangerous);
                assert_eq!(req.min_approvals, 1);
                assert!(!req.require_different_model);
            },
            CreateOutcome::Skipped => panic!("expected a created request"),
        }
    }

    #[tokio::test]
    async fn critical_command_requires_different_model() {
        let repo = repo().await;
        let sid = active_session(&repo, "/proj", "gpt").await;
        let classifier = PatternEngine::new().unwrap();
        let redactor = Redactor::default();
        let cfg = SlbConfig::default();

        let outcome = create_request(
            &repo,
            &classifier,
            &redactor,
            &cfg,
            NewCommand {
                session_id: sid,
                command_raw: "DROP DATABASE prod",
                cwd: "/proj",
                justification: Justification::default(),
            },
        )
        .await
        .unwrap();
        match outcome {
            CreateOutcome::Created(req) => {
                assert_eq!(req.risk_tier, RiskTier::Critical);
                assert!(req.require_different_model);
                assert_eq!(req.min_approvals, 2);
            },
            CreateOutcome::Skipped => panic!("expected a created request"),
        }
    }

    #[tokio::test]
    async fn blocked_agent_is_rejected() {
        let repo = repo().await;
        let sid = active_session(&repo, "/proj", "gpt").await;
        let classifier = PatternEngine::new().unwrap();
        let redactor = Redactor::default();
        let mut cfg = SlbConfig::default();
        cfg.blocked_agents.push("agent-a".to_string());

        let result = create_request(
            &repo,
            &classifier,
            &redactor,
            &cfg,
            NewCommand { session_id: sid, command_raw: "rm -rf /tmp", cwd: "/proj", justification: Justification::default() },
        )
        .await;
        assert!(result.is_err());
    }
}
