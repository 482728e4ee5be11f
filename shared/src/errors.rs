//! Shared error types for the outreach sequencing system

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Sequence has no touches: {sequence_id}")]
    EmptyTouchList { sequence_id: String },

    #[error("Touch offsets must be strictly increasing: touch {index} in sequence {sequence_id}")]
    NonIncreasingOffsets { sequence_id: String, index: usize },

    #[error("Lead has no contact method (email or phone required): {lead_id}")]
    MissingContactMethod { lead_id: String },

    #[error("Sequence is not active: {sequence_id}")]
    InactiveSequence { sequence_id: String },

    #[error("Invalid UUID: {input}")]
    InvalidUuid { input: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
