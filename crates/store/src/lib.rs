//! Data model and repository contract for the control plane (§3, §6).

pub mod model;
pub mod repository;
pub mod sqlite;

pub use {
    model::{
        CommandSpec, Decision, Execution, FilesystemRollback, GitRollback, Justification,
        KubernetesManifest, KubernetesRollback, Request, RequestStatus, Review, RollbackData,
        RollbackMetadata, RollbackRoot, Session,
    },
    repository::{DecideFn, Repository, SubmitReviewOutcome},
    sqlite::{run_migrations, SqliteRepository},
};
