//! SQLite-backed [`Repository`] using sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slb_common::{impl_context, FromMessage, RequestId, RiskTier, SessionId};
use sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions};

use crate::{
    model::{
        CommandSpec, Decision, Execution, Justification, Request, RequestStatus, Review, Session,
    },
    repository::{DecideFn, Repository, SubmitReviewOutcome},
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

type Result<T> = std::result::Result<T, Error>;
impl_context!();

impl From<Error> for slb_common::Error {
    fn from(e: Error) -> Self {
        slb_common::Error::other(e)
    }
}

fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .context("invalid timestamp")?
        .with_timezone(&Utc))
}

fn parse_ts_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(&s)).transpose()
}

/// SQLite-backed persistence for sessions, requests, and reviews.
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connect, run migrations, and return a ready repository.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Build a repository from an existing pool. Migrations must already
    /// have been run via [`run_migrations`].
    #[must_use]
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Run pending migrations against `pool`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Message(format!("migration failed: {e}")))?;
    Ok(())
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.get::<String, _>("id").parse().context("session id")?,
        agent: row.get("agent"),
        program: row.get("program"),
        model: row.get("model"),
        project_path: row.get("project_path"),
        session_key: row.get("session_key"),
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        last_active_at: parse_ts(&row.get::<String, _>("last_active_at"))?,
        ended_at: parse_ts_opt(row.get::<Option<String>, _>("ended_at"))?,
    })
}

fn request_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Request> {
    let argv: Option<String> = row.get("command_argv");
    let argv = argv
        .map(|s| serde_json::from_str::<Vec<String>>(&s))
        .transpose()
        .map_err(|e| Error::Message(format!("command_argv decode: {e}")))?;

    let exec_log_path: Option<String> = row.get("execution_log_path");
    let execution = exec_log_path.map(|log_path| -> Result<Execution> {
        Ok(Execution {
            executed_at: parse_ts(&row.get::<String, _>("execution_executed_at"))?,
            executed_by_session_id: row
                .get::<String, _>("execution_executed_by_session_id")
                .parse()
                .context("execution session id")?,
            executed_by_agent: row.get("execution_executed_by_agent"),
            executed_by_model: row.get("execution_executed_by_model"),
            log_path,
            exit_code: row.get::<Option<i64>, _>("execution_exit_code").map(|v| v as i32),
            duration_ms: row.get::<Option<i64>, _>("execution_duration_ms"),
        })
    });
    let execution = execution.transpose()?;

    Ok(Request {
        id: row.get::<String, _>("id").parse().context("request id")?,
        project_path: row.get("project_path"),
        requestor_session_id: row
            .get::<String, _>("requestor_session_id")
            .parse()
            .context("requestor session id")?,
        requestor_agent: row.get("requestor_agent"),
        requestor_model: row.get("requestor_model"),
        risk_tier: row
            .get::<String, _>("risk_tier")
            .parse::<RiskTier>()
            .map_err(Error::Message)?,
        min_approvals: row.get::<i64, _>("min_approvals") as u32,
        require_different_model: row.get::<i64, _>("require_different_model") != 0,
        command: CommandSpec {
            raw: row.get("command_raw"),
            argv,
            cwd: row.get("command_cwd"),
            shell: row.get::<i64, _>("command_shell") != 0,
            display_redacted: row.get("command_display_redacted"),
            contains_sensitive: row.get::<i64, _>("command_contains_sensitive") != 0,
            hash: row.get("command_hash"),
        },
        justification: Justification {
            reason: row.get("justification_reason"),
            expected_effect: row.get("justification_expected_effect"),
            goal: row.get("justification_goal"),
            safety_argument: row.get("justification_safety_argument"),
        },
        status: row
            .get::<String, _>("status")
            .parse::<RequestStatus>()
            .map_err(Error::Message)?,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        expires_at: parse_ts(&row.get::<String, _>("expires_at"))?,
        approval_expires_at: parse_ts_opt(row.get::<Option<String>, _>("approval_expires_at"))?,
        resolved_at: parse_ts_opt(row.get::<Option<String>, _>("resolved_at"))?,
        execution,
        rollback_path: row.get("rollback_path"),
    })
}

fn review_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Review> {
    Ok(Review {
        id: row.get::<String, _>("id").parse().context("review id")?,
        request_id: row
            .get::<String, _>("request_id")
            .parse()
            .context("request id")?,
        reviewer_session_id: row
            .get::<String, _>("reviewer_session_id")
            .parse()
            .context("reviewer session id")?,
        reviewer_agent: row.get("reviewer_agent"),
        reviewer_model: row.get("reviewer_model"),
        decision: row
            .get::<String, _>("decision")
            .parse::<Decision>()
            .map_err(Error::Message)?,
        comments: row.get("comments"),
        signature: row.get("signature"),
        signature_timestamp: parse_ts(&row.get::<String, _>("signature_timestamp"))?,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
    })
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create_session(&self, session: &Session) -> slb_common::Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, agent, program, model, project_path, session_key, created_at, last_active_at, ended_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(&session.agent)
        .bind(&session.program)
        .bind(&session.model)
        .bind(&session.project_path)
        .bind(&session.session_key)
        .bind(ts(session.created_at))
        .bind(ts(session.last_active_at))
        .bind(session.ended_at.map(ts))
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> slb_common::Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?;
        row.as_ref()
            .map(session_from_row)
            .transpose()
            .map_err(Into::into)
    }

    async fn end_session(&self, id: SessionId) -> slb_common::Result<()> {
        sqlx::query("UPDATE sessions SET ended_at = ? WHERE id = ?")
            .bind(ts(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn list_active_sessions(&self, project_path: &str) -> slb_common::Result<Vec<Session>> {
        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE project_path = ? AND ended_at IS NULL ORDER BY created_at",
        )
        .bind(project_path)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from)?;
        rows.iter()
            .map(session_from_row)
            .collect::<Result<Vec<_>>>()
            .map_err(Into::into)
    }

    async fn different_model_exists(
        &self,
        project_path: &str,
        excluding_model: &str,
    ) -> slb_common::Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) as c FROM sessions
             WHERE project_path = ? AND ended_at IS NULL AND model <> ?",
        )
        .bind(project_path)
        .bind(excluding_model)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(row.get::<i64, _>("c") > 0)
    }

    async fn create_request(&self, r: &Request) -> slb_common::Result<()> {
        let argv = r
            .command
            .argv
            .as_ref()
            .map(|v| serde_json::to_string(v))
            .transpose()
            .map_err(|e| Error::Message(format!("command_argv encode: {e}")))?;

        sqlx::query(
            "INSERT INTO requests (
                id, project_path, requestor_session_id, requestor_agent, requestor_model,
                risk_tier, min_approvals, require_different_model,
                command_raw, command_argv, command_cwd, command_shell,
                command_display_redacted, command_contains_sensitive, command_hash,
                justification_reason, justification_expected_effect, justification_goal,
                justification_safety_argument, status, created_at, expires_at,
                approval_expires_at, resolved_at, rollback_path
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(r.id.to_string())
        .bind(&r.project_path)
        .bind(r.requestor_session_id.to_string())
        .bind(&r.requestor_agent)
        .bind(&r.requestor_model)
        .bind(r.risk_tier.as_str())
        .bind(r.min_approvals as i64)
        .bind(r.require_different_model as i64)
        .bind(&r.command.raw)
        .bind(argv)
        .bind(&r.command.cwd)
        .bind(r.command.shell as i64)
        .bind(&r.command.display_redacted)
        .bind(r.command.contains_sensitive as i64)
        .bind(&r.command.hash)
        .bind(&r.justification.reason)
        .bind(&r.justification.expected_effect)
        .bind(&r.justification.goal)
        .bind(&r.justification.safety_argument)
        .bind(r.status.as_str())
        .bind(ts(r.created_at))
        .bind(ts(r.expires_at))
        .bind(r.approval_expires_at.map(ts))
        .bind(r.resolved_at.map(ts))
        .bind(&r.rollback_path)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(())
    }

    async fn get_request(&self, id: RequestId) -> slb_common::Result<Option<Request>> {
        let row = sqlx::query("SELECT * FROM requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?;
        row.as_ref()
            .map(request_from_row)
            .transpose()
            .map_err(Into::into)
    }

    async fn list_pending_requests(&self, project_path: &str) -> slb_common::Result<Vec<Request>> {
        let rows = sqlx::query(
            "SELECT * FROM requests WHERE project_path = ? AND status = 'pending' ORDER BY created_at",
        )
        .bind(project_path)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from)?;
        rows.iter()
            .map(request_from_row)
            .collect::<Result<Vec<_>>>()
            .map_err(Into::into)
    }

    async fn list_pending_requiring_different_model(&self) -> slb_common::Result<Vec<Request>> {
        let rows = sqlx::query(
            "SELECT * FROM requests WHERE status = 'pending' AND require_different_model = 1 ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from)?;
        rows.iter()
            .map(request_from_row)
            .collect::<Result<Vec<_>>>()
            .map_err(Into::into)
    }

    async fn update_status(
        &self,
        id: RequestId,
        expected: RequestStatus,
        new: RequestStatus,
        resolved_at: Option<DateTime<Utc>>,
        approval_expires_at: Option<DateTime<Utc>>,
    ) -> slb_common::Result<bool> {
        let result = sqlx::query(
            "UPDATE requests SET status = ?, resolved_at = ?, approval_expires_at = COALESCE(?, approval_expires_at)
             WHERE id = ? AND status = ?",
        )
        .bind(new.as_str())
        .bind(resolved_at.map(ts))
        .bind(approval_expires_at.map(ts))
        .bind(id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_execution(&self, id: RequestId, execution: &Execution) -> slb_common::Result<()> {
        sqlx::query(
            "UPDATE requests SET
                execution_executed_at = ?,
                execution_executed_by_session_id = ?,
                execution_executed_by_agent = ?,
                execution_executed_by_model = ?,
                execution_log_path = ?,
                execution_exit_code = ?,
                execution_duration_ms = ?
             WHERE id = ?",
        )
        .bind(ts(execution.executed_at))
        .bind(execution.executed_by_session_id.to_string())
        .bind(&execution.executed_by_agent)
        .bind(&execution.executed_by_model)
        .bind(&execution.log_path)
        .bind(execution.exit_code.map(i64::from))
        .bind(execution.duration_ms)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(())
    }

    async fn set_rollback_path(&self, id: RequestId, path: &str) -> slb_common::Result<()> {
        sqlx::query("UPDATE requests SET rollback_path = ? WHERE id = ?")
            .bind(path)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn has_reviewer_reviewed(
        &self,
        request_id: RequestId,
        session_id: SessionId,
    ) -> slb_common::Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) as c FROM reviews WHERE request_id = ? AND reviewer_session_id = ?",
        )
        .bind(request_id.to_string())
        .bind(session_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)?;
        Ok(row.get::<i64, _>("c") > 0)
    }

    async fn list_reviews_for_request(&self, request_id: RequestId) -> slb_common::Result<Vec<Review>> {
        let rows = sqlx::query("SELECT * FROM reviews WHERE request_id = ? ORDER BY created_at")
            .bind(request_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from)?;
        rows.iter()
            .map(review_from_row)
            .collect::<Result<Vec<_>>>()
            .map_err(Into::into)
    }

    async fn count_by_decision(&self, request_id: RequestId) -> slb_common::Result<(u32, u32)> {
        count_by_decision_tx(&self.pool, request_id).await.map_err(Into::into)
    }

    async fn try_submit_review(
        &self,
        review: &Review,
        expected_status: RequestStatus,
        min_approvals: u32,
        decide: DecideFn,
    ) -> slb_common::Result<SubmitReviewOutcome> {
        let mut tx = self.pool.begin().await.map_err(Error::from)?;

        let dup: i64 = sqlx::query(
            "SELECT COUNT(*) as c FROM reviews WHERE request_id = ? AND reviewer_session_id = ?",
        )
        .bind(review.request_id.to_string())
        .bind(review.reviewer_session_id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::from)?
        .get("c");
        if dup > 0 {
            tx.rollback().await.map_err(Error::from)?;
            return Ok(SubmitReviewOutcome::AlreadyReviewed);
        }

        sqlx::query(
            "INSERT INTO reviews (id, request_id, reviewer_session_id, reviewer_agent, reviewer_model, decision, comments, signature, signature_timestamp, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(review.id.to_string())
        .bind(review.request_id.to_string())
        .bind(review.reviewer_session_id.to_string())
        .bind(&review.reviewer_agent)
        .bind(&review.reviewer_model)
        .bind(review.decision.as_str())
        .bind(&review.comments)
        .bind(&review.signature)
        .bind(ts(review.signature_timestamp))
        .bind(ts(review.created_at))
        .execute(&mut *tx)
        .await
        .map_err(Error::from)?;

        let (approvals, rejections) = count_by_decision_tx(&mut *tx, review.request_id)
            .await
            .map_err(Error::from)?;

        let new_status = decide(approvals, rejections, min_approvals);

        let outcome = match new_status {
            None => SubmitReviewOutcome::Recorded {
                approvals,
                rejections,
                new_status: None,
            },
            Some(ns) => {
                let result = sqlx::query(
                    "UPDATE requests SET status = ?, resolved_at = ?, approval_expires_at = COALESCE(?, approval_expires_at)
                     WHERE id = ? AND status = ?",
                )
                .bind(ns.as_str())
                .bind(ns.is_terminal().then(Utc::now).map(ts))
                .bind(None::<String>)
                .bind(review.request_id.to_string())
                .bind(expected_status.as_str())
                .execute(&mut *tx)
                .await
                .map_err(Error::from)?;

                if result.rows_affected() == 0 {
                    SubmitReviewOutcome::CasConflict {
                        approvals,
                        rejections,
                    }
                } else {
                    SubmitReviewOutcome::Recorded {
                        approvals,
                        rejections,
                        new_status: Some(ns),
                    }
                }
            },
        };

        tx.commit().await.map_err(Error::from)?;
        Ok(outcome)
    }
}

async fn count_by_decision_tx<'c, E>(executor: E, request_id: RequestId) -> Result<(u32, u32)>
where
    E: sqlx::Executor<'c, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        "SELECT
            SUM(CASE WHEN decision = 'approve' THEN 1 ELSE 0 END) as approvals,
            SUM(CASE WHEN decision = 'reject' THEN 1 ELSE 0 END) as rejections
         FROM reviews WHERE request_id = ?",
    )
    .bind(request_id.to_string())
    .fetch_one(executor)
    .await?;
    let approvals: Option<i64> = row.get("approvals");
    let rejections: Option<i64> = row.get("rejections");
    Ok((approvals.unwrap_or(0) as u32, rejections.unwrap_or(0) as u32))
}
