//! Shared types for the outreach sequencing system
//!
//! Contains the domain value types used by both the sequencer engine and the
//! webserver: identifiers, sequence definitions, lead enrollments and their
//! dispatch audit log, plus the shared error enum and tracing bootstrap.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::{SharedError, SharedResult};
pub use types::{
    Channel, DispatchOutcome, DispatchRecord, EnrollmentId, EnrollmentStatus, LeadEnrollment,
    LeadId, LeadProfile, SequenceDefinition, SequenceId, TenantId, Touch,
};
