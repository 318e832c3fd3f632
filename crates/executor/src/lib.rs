//! Executes an approved command (§4.6): ordered gates, an exclusive
//! approved-to-executing transition, process spawn with a capped output
//! buffer, and best-effort rollback capture.

pub mod executor;
pub mod gates;
pub mod log_file;
pub mod output;

pub use {
    executor::{execute_approved, ExecuteApproved, ExecutionResult},
    gates::check_gates,
    log_file::log_file_path,
    output::CappedBuffer,
};
