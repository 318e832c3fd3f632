//! Request lifecycle: creation (§4.4) and the state machine (§4.3).

pub mod creator;
pub mod redaction;
pub mod transitions;

pub use {
    creator::{command_hash, create_request, CreateOutcome, NewCommand},
    redaction::Redactor,
    transitions::{allowed_destinations, approval_ttl, transition_timestamps, validate_transition, TransitionOutcome},
};
