//! Sequencer-specific error types

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("Enrollment not found: {enrollment_id}")]
    EnrollmentNotFound { enrollment_id: String },

    #[error("Enrollment already exists: {enrollment_id}")]
    EnrollmentExists { enrollment_id: String },

    #[error("Unknown sequence: {sequence_id}")]
    UnknownSequence { sequence_id: String },

    #[error("Concurrent update detected for enrollment {enrollment_id}: expected version {expected}, found {found}")]
    VersionConflict {
        enrollment_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type SequencerResult<T> = Result<T, SequencerError>;

impl SequencerError {
    /// Version conflicts are expected under concurrent evaluation and are
    /// silently discarded rather than surfaced
    pub fn is_conflict(&self) -> bool {
        matches!(self, SequencerError::VersionConflict { .. })
    }
}
