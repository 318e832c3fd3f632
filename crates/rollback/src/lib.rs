//! Rollback capture (§4.7) and restore (§4.8) for filesystem, git, and
//! kubernetes-targeting commands.

pub mod capture;
pub mod kind;
pub mod restore;
pub mod sanitize;

pub use {
    capture::{capture_filesystem, capture_git, capture_kubernetes},
    kind::{detect_kind, RollbackKind},
    restore::{restore, RestoreOptions},
    sanitize::sanitize_filename,
};
