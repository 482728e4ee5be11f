//! Outreach sequencer library
//!
//! Implements the lead nurturing workflow as a real state machine: durable
//! due-time scheduling, at-most-once dispatch enforced through optimistic
//! versioning, exponential retry backoff, and per-touch skip semantics for
//! unreachable channels.

pub mod config;
pub mod core;
pub mod error;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use config::{EngineConfig, RetryPolicy};
pub use core::{Evaluation, SequencerEngine, TickRunner, TickSummary};
pub use error::{SequencerError, SequencerResult};
pub use traits::{
    DeliveryError, DeliveryReceipt, EmailSender, EnrollmentStore, MessageSender, SequenceStore,
    VersionedEnrollment,
};
