//! Review engine: submitting reviews (§4.5), conflict-resolution policies,
//! HMAC signatures, and the different-model escalation sweeper.

pub mod engine;
pub mod escalation;
pub mod policy;
pub mod signature;

pub use {
    engine::{submit_review, ReviewResult, SubmitReview},
    escalation::{run_escalation_sweep, SweepOutcome},
    policy::decide_fn,
};
