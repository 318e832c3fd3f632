use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Conflict-resolution policy applied when counting reviews (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    AnyRejectionBlocks,
    FirstWins,
    HumanBreaksTie,
}

impl Default for ConflictResolution {
    fn default() -> Self {
        Self::AnyRejectionBlocks
    }
}

/// `request.*` knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// How long an unreviewed request stays pending before it is eligible to
    /// time out.
    pub ttl_minutes: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { ttl_minutes: 60 }
    }
}

/// `approval.*` knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub ttl_minutes: u64,
    pub ttl_critical_minutes: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 30,
            ttl_critical_minutes: 10,
        }
    }
}

/// Per-tier `min_approvals` override, keyed by tier name (`safe`, `caution`,
/// `dangerous`, `critical`). Unset tiers fall back to the classifier's
/// built-in default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    pub min_approvals: HashMap<String, u32>,
}

/// `dynamic_quorum.*` knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicQuorumConfig {
    pub enabled: bool,
    /// Minimum min_approvals dynamic quorum will ever produce.
    pub floor: u32,
}

impl Default for DynamicQuorumConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            floor: 1,
        }
    }
}

/// `review.*` knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub conflict_resolution: ConflictResolution,
    /// Agent names permitted to approve their own request, subject to
    /// `trusted_self_approve_delay`.
    pub trusted_self_approve: Vec<String>,
    pub trusted_self_approve_delay_minutes: u64,
    pub different_model_timeout_minutes: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            conflict_resolution: ConflictResolution::default(),
            trusted_self_approve: Vec::new(),
            trusted_self_approve_delay_minutes: 5,
            different_model_timeout_minutes: 5,
        }
    }
}

/// `execution.*` knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub default_timeout_seconds: u64,
    pub log_dir: String,
    pub max_rollback_size_mb: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 5 * 60,
            log_dir: ".slb/logs".to_string(),
            max_rollback_size_mb: 100,
        }
    }
}

/// `attachments.*` knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentsConfig {
    pub max_file_size: u64,
    pub max_output_size: u64,
    pub max_command_runtime_seconds: u64,
    pub max_image_size: u64,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 25 * 1024 * 1024,
            max_output_size: 10 * 1024 * 1024,
            max_command_runtime_seconds: 5 * 60,
            max_image_size: 10 * 1024 * 1024,
        }
    }
}

/// Root configuration for the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlbConfig {
    pub request: RequestConfig,
    pub approval: ApprovalConfig,
    pub patterns: PatternsConfig,
    pub dynamic_quorum: DynamicQuorumConfig,
    pub review: ReviewConfig,
    pub execution: ExecutionConfig,
    pub attachments: AttachmentsConfig,
    pub blocked_agents: Vec<String>,
}
