use std::{sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use slb_classifier::PatternEngine;
use slb_common::{RequestId, SessionId};
use slb_core::{spawn_escalation_sweeper, Engine};
use slb_notify::NoopNotifier;
use slb_requests::NewCommand;
use slb_review::SubmitReview;
use slb_store::{model::Justification, Repository, SqliteRepository};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "slb", about = "Command-approval control plane for multi-agent workspaces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Path to the SQLite database file; `:memory:` for an ephemeral store.
    #[arg(long, global = true, env = "SLB_DATABASE", default_value = "slb.db")]
    database: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the escalation sweeper loop until interrupted.
    Serve,
    /// Submit a command for classification and, if needed, review.
    Submit {
        #[arg(long)]
        session: SessionId,
        #[arg(long)]
        cwd: String,
        /// The raw command string.
        command: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Record a signed review decision on a pending request.
    Review {
        #[arg(long)]
        session: SessionId,
        #[arg(long)]
        session_key: String,
        #[arg(long)]
        request: RequestId,
        /// `approve` or `reject`.
        decision: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Execute an approved request.
    Execute {
        #[arg(long)]
        session: SessionId,
        #[arg(long)]
        request: RequestId,
    },
    /// Run one escalation sweep immediately and exit.
    Sweep,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(fmt::layer().json().with_target(true).with_thread_ids(false)).init();
    } else {
        registry.with(fmt::layer().with_target(false).with_thread_ids(false).with_ansi(true)).init();
    }
}

async fn build_engine(database: &str) -> anyhow::Result<Arc<Engine>> {
    let config = slb_config::discover_and_load();
    let repo: Arc<dyn Repository> = Arc::new(SqliteRepository::new(&format!("sqlite:{database}")).await?);
    let classifier = Arc::new(PatternEngine::new()?);
    Ok(Arc::new(Engine::new(repo, classifier, Arc::new(config), Arc::new(NoopNotifier))))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "slb starting");

    let engine = build_engine(&cli.database).await?;

    match cli.command {
        Commands::Serve => {
            let interval = Duration::from_secs(engine.config.review.different_model_timeout_minutes.max(1) * 60 / 5);
            let handle = spawn_escalation_sweeper(Arc::clone(&engine), interval);
            handle.await?;
            Ok(())
        },
        Commands::Submit { session, cwd, command, reason } => {
            let mut justification = Justification::default();
            if let Some(reason) = reason {
                justification.reason = reason;
            }
            let outcome = engine.submit_command(NewCommand { session_id: session, command_raw: &command, cwd: &cwd, justification }).await?;
            match outcome {
                slb_requests::CreateOutcome::Created(request) => {
                    println!("created request {} ({}), min_approvals={}", request.id, request.risk_tier, request.min_approvals);
                },
                slb_requests::CreateOutcome::Skipped => println!("command is safe; no review needed"),
            }
            Ok(())
        },
        Commands::Review { session, session_key, request, decision, comment } => {
            let outcome = engine
                .submit_review(SubmitReview { session_id: session, session_key: &session_key, request_id: request, decision: &decision, comments: comment })
                .await?;
            println!("{outcome:?}");
            Ok(())
        },
        Commands::Execute { session, request } => {
            let result = engine
                .execute(slb_executor::ExecuteApproved {
                    request_id: request,
                    session_id: session,
                    timeout: None,
                    log_dir: None,
                    suppress_output: false,
                    capture_rollback: true,
                    max_rollback_size_mb: None,
                    cancellation: None,
                })
                .await?;
            println!(
                "exit_code={:?} timed_out={} cancelled={} log={}",
                result.exit_code,
                result.timed_out,
                result.cancelled,
                result.log_path.display()
            );
            Ok(())
        },
        Commands::Sweep => {
            let outcomes = slb_review::run_escalation_sweep(engine.repo.as_ref(), &engine.config.review).await?;
            println!("{} requests inspected", outcomes.len());
            Ok(())
        },
    }
}
