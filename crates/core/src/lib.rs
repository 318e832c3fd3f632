//! Assembles the control plane's components behind one [`Engine`] facade and
//! owns the background escalation sweeper.

pub mod engine;

pub use engine::{spawn_escalation_sweeper, Engine};
