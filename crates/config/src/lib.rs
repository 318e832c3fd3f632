//! Configuration loading, validation, and env substitution for the control
//! plane.
//!
//! Config files: `slb.toml`, `slb.yaml`, or `slb.json`, searched in `./` then
//! `~/.config/slb/`. Supports `${ENV_VAR}` substitution in string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_or_default_config_path, load_config, save_config},
    schema::{
        ApprovalConfig, AttachmentsConfig, ConflictResolution, DynamicQuorumConfig,
        ExecutionConfig, PatternsConfig, RequestConfig, ReviewConfig, SlbConfig,
    },
    validate::{validate, Diagnostic},
};
