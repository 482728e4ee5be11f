//! Core sequencing logic
//!
//! The engine state machine, the batch tick driver, and the pure template
//! renderer. Everything here is deterministic given the injected
//! capabilities; all I/O lives behind the traits in `crate::traits`.

pub mod engine;
pub mod runner;
pub mod template;

pub use engine::{Evaluation, SequencerEngine};
pub use runner::{TickRunner, TickSummary};
