//! Classifies a normalized command into a risk tier (§4.2).

pub mod classify;
pub mod engine;
pub mod patterns;

pub use {
    classify::{classify, ClassifyResult},
    engine::{PatternEngine, PatternEntry, PatternSource},
};
