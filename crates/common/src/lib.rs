//! Shared types, error definitions, and identifiers used across all slb crates.

pub mod engine_error;
pub mod error;
pub mod ids;
pub mod risk_tier;

pub use {
    engine_error::EngineError,
    error::{Error, FromMessage, Result},
    ids::{RequestId, ReviewId, SessionId},
    risk_tier::RiskTier,
};
