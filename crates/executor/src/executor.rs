//! §4.6 `execute_approved`: runs the gates, transitions the request
//! exclusively into `executing`, spawns the command, and records the
//! outcome.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use chrono::Utc;
use slb_classifier::PatternEngine;
use slb_common::{EngineError, RequestId, SessionId};
use slb_config::SlbConfig;
use slb_store::{
    model::{Execution, RequestStatus},
    Repository,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::Command,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{gates::check_gates, log_file::log_file_path, output::CappedBuffer};

/// Input to [`execute_approved`]; unset fields fall back to configuration
/// defaults.
pub struct ExecuteApproved {
    pub request_id: RequestId,
    pub session_id: SessionId,
    pub timeout: Option<StdDuration>,
    pub log_dir: Option<PathBuf>,
    pub suppress_output: bool,
    pub capture_rollback: bool,
    pub max_rollback_size_mb: Option<u64>,
    /// External cancellation handle for long-running executions. A caller
    /// that never cancels can leave this `None`; an unset token behaves as
    /// one that is never cancelled.
    pub cancellation: Option<CancellationToken>,
}

/// Outcome of a completed (or timed-out/cancelled) execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub output_tail: String,
    pub truncated: bool,
    pub log_path: PathBuf,
    pub duration_ms: i64,
    pub rollback_path: Option<String>,
}

/// Run the approved command for `input.request_id` (§4.6).
pub async fn execute_approved(
    repo: &dyn Repository,
    classifier: &PatternEngine,
    config: &SlbConfig,
    input: ExecuteApproved,
) -> Result<ExecutionResult, EngineError> {
    let request = check_gates(repo, classifier, input.request_id, input.session_id).await?;
    let session = repo
        .get_session(input.session_id)
        .await
        .map_err(other)?
        .ok_or(EngineError::SessionNotFound)?;

    // G6: the exclusive approved -> executing transition.
    let applied = repo
        .update_status(request.id, RequestStatus::Approved, RequestStatus::Executing, None, None)
        .await
        .map_err(other)?;
    if !applied {
        return Err(EngineError::AlreadyExecuting);
    }

    let log_dir = input.log_dir.unwrap_or_else(|| Path::new(&request.project_path).join(&config.execution.log_dir));
    if let Err(err) = std::fs::create_dir_all(&log_dir) {
        let _ = repo.update_status(request.id, RequestStatus::Executing, RequestStatus::Approved, None, None).await;
        return Err(EngineError::Other(format!("failed to create log directory: {err}")));
    }

    let now = Utc::now();
    let log_path = log_file_path(&log_dir, request.id, now);
    if let Err(err) = std::fs::File::create(&log_path) {
        let _ = repo.update_status(request.id, RequestStatus::Executing, RequestStatus::Approved, None, None).await;
        return Err(EngineError::Other(format!("failed to create log file: {err}")));
    }

    let execution = Execution {
        executed_at: now,
        executed_by_session_id: session.id,
        executed_by_agent: session.agent.clone(),
        executed_by_model: session.model.clone(),
        log_path: log_path.to_string_lossy().into_owned(),
        exit_code: None,
        duration_ms: None,
    };
    repo.update_execution(request.id, &execution).await.map_err(other)?;

    let rollback_path = if input.capture_rollback {
        capture_rollback_best_effort(repo, &request, &log_dir, input.max_rollback_size_mb.unwrap_or(config.execution.max_rollback_size_mb)).await
    } else {
        None
    };

    let timeout = input.timeout.unwrap_or_else(|| StdDuration::from_secs(config.execution.default_timeout_seconds));
    let cancellation = input.cancellation.unwrap_or_default();
    let started = std::time::Instant::now();
    let run_outcome = run_and_stream(&request.command.raw, &request.command.cwd, &log_path, timeout, input.suppress_output, cancellation).await;
    let duration_ms = started.elapsed().as_millis() as i64;

    match run_outcome {
        Ok((exit_code, buffer)) => {
            let truncated = buffer.truncated();
            let output_tail = buffer.into_text();
            let new_status = if exit_code == 0 { RequestStatus::Executed } else { RequestStatus::ExecutionFailed };
            let mut final_execution = execution;
            final_execution.exit_code = Some(exit_code);
            final_execution.duration_ms = Some(duration_ms);
            repo.update_execution(request.id, &final_execution).await.map_err(other)?;
            let resolved_at = new_status.is_terminal().then_some(Utc::now());
            let applied = repo.update_status(request.id, RequestStatus::Executing, new_status, resolved_at, None).await.map_err(other)?;
            if !applied {
                warn!(request_id = %request.id, "status changed out from under a completed execution");
            }
            Ok(ExecutionResult { exit_code: Some(exit_code), timed_out: false, cancelled: false, output_tail, truncated, log_path, duration_ms, rollback_path })
        },
        Err(RunError::TimedOut(buffer)) => {
            let truncated = buffer.truncated();
            let output_tail = buffer.into_text();
            let resolved_at = Some(Utc::now());
            let applied = repo.update_status(request.id, RequestStatus::Executing, RequestStatus::TimedOut, resolved_at, None).await.map_err(other)?;
            if !applied {
                warn!(request_id = %request.id, "status changed out from under a timed-out execution");
            }
            Ok(ExecutionResult { exit_code: None, timed_out: true, cancelled: false, output_tail, truncated, log_path, duration_ms, rollback_path })
        },
        Err(RunError::Cancelled(buffer)) => {
            let truncated = buffer.truncated();
            let output_tail = buffer.into_text();
            let resolved_at = Some(Utc::now());
            let applied = repo.update_status(request.id, RequestStatus::Executing, RequestStatus::ExecutionFailed, resolved_at, None).await.map_err(other)?;
            if !applied {
                warn!(request_id = %request.id, "status changed out from under a cancelled execution");
            }
            Ok(ExecutionResult { exit_code: None, timed_out: false, cancelled: true, output_tail, truncated, log_path, duration_ms, rollback_path })
        },
        Err(RunError::SpawnFailed(message)) => {
            let resolved_at = Some(Utc::now());
            let _ = repo.update_status(request.id, RequestStatus::Executing, RequestStatus::ExecutionFailed, resolved_at, None).await;
            Err(EngineError::Other(message))
        },
    }
}

async fn capture_rollback_best_effort(repo: &dyn Repository, request: &slb_store::model::Request, log_dir: &Path, max_size_mb: u64) -> Option<String> {
    let tokens_owned = shlex::split(&request.command.raw)?;
    let tokens: Vec<&str> = tokens_owned.iter().map(String::as_str).collect();
    let kind = slb_rollback::detect_kind(&tokens)?;

    let rollback_dir = log_dir.join(format!("rollback-{}", &request.id.to_string()[..8]));
    if let Err(err) = std::fs::create_dir_all(&rollback_dir) {
        warn!(request_id = %request.id, error = %err, "failed to create rollback directory; skipping capture");
        return None;
    }

    let capture_result = match kind {
        slb_rollback::RollbackKind::Filesystem => slb_rollback::capture_filesystem(&request.command.cwd, &tokens[1..], &rollback_dir, max_size_mb).await,
        slb_rollback::RollbackKind::Git => slb_rollback::capture_git(&request.command.cwd, &rollback_dir).await,
        slb_rollback::RollbackKind::Kubernetes => slb_rollback::capture_kubernetes(&tokens, &rollback_dir).await,
    };

    match capture_result {
        Ok(_data) => {
            let path = rollback_dir.to_string_lossy().into_owned();
            if let Err(err) = repo.set_rollback_path(request.id, &path).await {
                warn!(request_id = %request.id, error = %err, "failed to persist rollback path");
            }
            info!(request_id = %request.id, rollback_path = %path, "rollback snapshot captured");
            Some(path)
        },
        Err(err) => {
            warn!(request_id = %request.id, error = %err, "rollback capture failed; continuing without a snapshot");
            None
        },
    }
}

enum RunError {
    TimedOut(CappedBuffer),
    Cancelled(CappedBuffer),
    SpawnFailed(String),
}

/// What ended the race between the child's own completion, the deadline,
/// and an external cancellation.
enum RunRace {
    Finished(Result<std::process::ExitStatus, RunError>),
    TimedOut,
    Cancelled,
}

async fn run_and_stream(
    command: &str,
    cwd: &str,
    log_path: &Path,
    timeout: StdDuration,
    suppress_output: bool,
    cancellation: CancellationToken,
) -> Result<(i32, CappedBuffer), RunError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.current_dir(cwd);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(std::process::Stdio::null());
    // Its own process group, so a kill reaches any children the shell
    // spawned (e.g. a backgrounded `sleep` left behind by `&`), not just
    // the immediate `sh` process.
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| RunError::SpawnFailed(format!("failed to spawn command: {e}")))?;
    let child_pid = child.id();
    let stdout = child.stdout.take().ok_or_else(|| RunError::SpawnFailed("child had no piped stdout".to_string()))?;
    let stderr = child.stderr.take().ok_or_else(|| RunError::SpawnFailed("child had no piped stderr".to_string()))?;

    let log_file = tokio::fs::File::create(log_path).await.map_err(|e| RunError::SpawnFailed(format!("failed to open log file: {e}")))?;
    let log_file = Arc::new(tokio::sync::Mutex::new(log_file));
    let buffer = Arc::new(Mutex::new(CappedBuffer::default()));

    let wait = async {
        let stdout_pump = pump(stdout, Arc::clone(&log_file), Arc::clone(&buffer), suppress_output);
        let stderr_pump = pump(stderr, Arc::clone(&log_file), Arc::clone(&buffer), suppress_output);
        let (status, _, _) = tokio::join!(child.wait(), stdout_pump, stderr_pump);
        status.map_err(|e| RunError::SpawnFailed(format!("failed to wait on command: {e}")))
    };

    let race = tokio::select! {
        result = wait => RunRace::Finished(result),
        () = tokio::time::sleep(timeout) => RunRace::TimedOut,
        () = cancellation.cancelled() => RunRace::Cancelled,
    };

    match race {
        RunRace::Finished(Ok(status)) => {
            let buffer = Arc::try_unwrap(buffer).map(|m| m.into_inner().unwrap_or_default()).unwrap_or_default();
            Ok((status.code().unwrap_or(-1), buffer))
        },
        RunRace::Finished(Err(err)) => Err(err),
        RunRace::TimedOut => {
            kill_child(&mut child, child_pid).await;
            let buffer = Arc::try_unwrap(buffer).map(|m| m.into_inner().unwrap_or_default()).unwrap_or_default();
            Err(RunError::TimedOut(buffer))
        },
        RunRace::Cancelled => {
            kill_child(&mut child, child_pid).await;
            let buffer = Arc::try_unwrap(buffer).map(|m| m.into_inner().unwrap_or_default()).unwrap_or_default();
            Err(RunError::Cancelled(buffer))
        },
    }
}

/// Kill the whole process group rooted at `pid` (SIGKILL), falling back to
/// killing just the immediate child if the pid wasn't available.
async fn kill_child(child: &mut tokio::process::Child, pid: Option<u32>) {
    match pid {
        Some(pid) => {
            let _ = Command::new("kill").arg("-KILL").arg("--").arg(format!("-{pid}")).status().await;
        },
        None => {
            let _ = child.start_kill();
        },
    }
}

async fn pump<R: tokio::io::AsyncRead + Unpin>(mut reader: R, log_file: Arc<tokio::sync::Mutex<tokio::fs::File>>, buffer: Arc<Mutex<CappedBuffer>>, suppress_output: bool) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let mut file = log_file.lock().await;
                let _ = file.write_all(&chunk[..n]).await;
                drop(file);
                if !suppress_output {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push(&chunk[..n]);
                    }
                }
            },
            Err(_) => break,
        }
    }
}

fn other(err: slb_common::Error) -> EngineError {
    EngineError::Other(err.to_string())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use chrono::Duration;
    use slb_store::{
        model::{CommandSpec, Justification, Request, Session},
        SqliteRepository,
    };

    use super::*;

    async fn repo_with_approved(raw: &str) -> (SqliteRepository, RequestId, SessionId) {
        let repo = SqliteRepository::new("sqlite::memory:").await.unwrap();
        let session = Session {
            id: SessionId::new(),
            agent: "agent-a".to_string(),
            program: "cli".to_string(),
            model: "gpt".to_string(),
            project_path: "/tmp".to_string(),
            session_key: "key".to_string(),
            created_at: Utc::now(),
            last_active_at: Utc::now(),
            ended_at: None,
        };
        repo.create_session(&session).await.unwrap();

        let now = Utc::now();
        let hash = slb_requests::command_hash(raw, None, "/tmp", false);
        let request = Request {
            id: RequestId::new(),
            project_path: "/tmp".to_string(),
            requestor_session_id: session.id,
            requestor_agent: "agent-a".to_string(),
            requestor_model: "gpt".to_string(),
            risk_tier: slb_common::RiskTier::Dangerous,
            min_approvals: 1,
            require_different_model: false,
            command: CommandSpec { raw: raw.to_string(), argv: None, cwd: "/tmp".to_string(), shell: false, display_redacted: raw.to_string(), contains_sensitive: false, hash },
            justification: Justification::default(),
            status: RequestStatus::Approved,
            created_at: now,
            expires_at: now + Duration::hours(1),
            approval_expires_at: Some(now + Duration::minutes(10)),
            resolved_at: None,
            execution: None,
            rollback_path: None,
        };
        repo.create_request(&request).await.unwrap();
        (repo, request.id, session.id)
    }

    #[tokio::test]
    async fn successful_command_transitions_to_executed() {
        let (repo, request_id, session_id) = repo_with_approved("echo hello").await;
        let classifier = PatternEngine::new().unwrap();
        let config = SlbConfig::default();
        let log_dir = tempfile::tempdir().unwrap();

        let result = execute_approved(
            &repo,
            &classifier,
            &config,
            ExecuteApproved {
                request_id,
                session_id,
                timeout: Some(StdDuration::from_secs(5)),
                log_dir: Some(log_dir.path().to_path_buf()),
                suppress_output: false,
                capture_rollback: false,
                max_rollback_size_mb: None,
                cancellation: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(result.exit_code, Some(0));
        assert!(result.output_tail.contains("hello"));
        let stored = repo.get_request(request_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Executed);
    }

    #[tokio::test]
    async fn failing_command_transitions_to_execution_failed() {
        let (repo, request_id, session_id) = repo_with_approved("exit 3").await;
        let classifier = PatternEngine::new().unwrap();
        let config = SlbConfig::default();
        let log_dir = tempfile::tempdir().unwrap();

        let result = execute_approved(
            &repo,
            &classifier,
            &config,
            ExecuteApproved {
                request_id,
                session_id,
                timeout: Some(StdDuration::from_secs(5)),
                log_dir: Some(log_dir.path().to_path_buf()),
                suppress_output: false,
                capture_rollback: false,
                max_rollback_size_mb: None,
                cancellation: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(result.exit_code, Some(3));
        let stored = repo.get_request(request_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::ExecutionFailed);
    }

    #[tokio::test]
    async fn deadline_exceeded_times_out() {
        let (repo, request_id, session_id) = repo_with_approved("sleep 5").await;
        let classifier = PatternEngine::new().unwrap();
        let config = SlbConfig::default();
        let log_dir = tempfile::tempdir().unwrap();

        let result = execute_approved(
            &repo,
            &classifier,
            &config,
            ExecuteApproved {
                request_id,
                session_id,
                timeout: Some(StdDuration::from_millis(100)),
                log_dir: Some(log_dir.path().to_path_buf()),
                suppress_output: false,
                capture_rollback: false,
                max_rollback_size_mb: None,
                cancellation: None,
            },
        )
        .await
        .unwrap();

        assert!(result.timed_out);
        let stored = repo.get_request(request_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::TimedOut);
    }

    #[tokio::test]
    async fn external_cancellation_marks_execution_failed_not_timed_out() {
        let (repo, request_id, session_id) = repo_with_approved("sleep 5").await;
        let classifier = PatternEngine::new().unwrap();
        let config = SlbConfig::default();
        let log_dir = tempfile::tempdir().unwrap();
        let cancellation = CancellationToken::new();

        let spawned_cancellation = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            spawned_cancellation.cancel();
        });

        let result = execute_approved(
            &repo,
            &classifier,
            &config,
            ExecuteApproved {
                request_id,
                session_id,
                timeout: Some(StdDuration::from_secs(5)),
                log_dir: Some(log_dir.path().to_path_buf()),
                suppress_output: false,
                capture_rollback: false,
                max_rollback_size_mb: None,
                cancellation: Some(cancellation),
            },
        )
        .await
        .unwrap();

        assert!(!result.timed_out);
        assert!(result.cancelled);
        let stored = repo.get_request(request_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::ExecutionFailed);
    }

    #[tokio::test]
    async fn rejects_a_tampered_command_before_executing() {
        let (repo, _request_id, session_id) = repo_with_approved("echo hello").await;
        let classifier = PatternEngine::new().unwrap();
        let config = SlbConfig::default();
        let log_dir = tempfile::tempdir().unwrap();

        let bad_hash_request_id = {
            let now = Utc::now();
            let req = Request {
                id: RequestId::new(),
                project_path: "/tmp".to_string(),
                requestor_session_id: session_id,
                requestor_agent: "agent-a".to_string(),
                requestor_model: "gpt".to_string(),
                risk_tier: slb_common::RiskTier::Dangerous,
                min_approvals: 1,
                require_different_model: false,
                command: CommandSpec {
                    raw: "echo hello".to_string(),
                    argv: None,
                    cwd: "/tmp".to_string(),
                    shell: false,
                    display_redacted: "echo hello".to_string(),
                    contains_sensitive: false,
                    hash: "deliberately-wrong".to_string(),
                },
                justification: Justification::default(),
                status: RequestStatus::Approved,
                created_at: now,
                expires_at: now + Duration::hours(1),
                approval_expires_at: Some(now + Duration::minutes(10)),
                resolved_at: None,
                execution: None,
                rollback_path: None,
            };
            repo.create_request(&req).await.unwrap();
            req.id
        };

        let result = execute_approved(
            &repo,
            &classifier,
            &config,
            ExecuteApproved {
                request_id: bad_hash_request_id,
                session_id,
                timeout: Some(StdDuration::from_secs(5)),
                log_dir: Some(log_dir.path().to_path_buf()),
                suppress_output: false,
                capture_rollback: false,
                max_rollback_size_mb: None,
                cancellation: None,
            },
        )
        .await;

        assert_eq!(result.unwrap_err(), EngineError::HashMismatch);
    }
}
