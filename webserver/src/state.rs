//! Shared handler state
//!
//! The API layer talks to the same stores the engine polls, so an upserted
//! definition or a cancellation is visible to the very next tick without any
//! extra plumbing.

use std::sync::Arc;
use std::time::Instant;

use sequencer::traits::{EnrollmentStore, SequenceStore};

/// State handed to every request handler
pub struct AppState<S, L>
where
    S: SequenceStore,
    L: EnrollmentStore,
{
    pub sequences: Arc<S>,
    pub enrollments: Arc<L>,
    pub server_start_time: Instant,
}

impl<S, L> AppState<S, L>
where
    S: SequenceStore,
    L: EnrollmentStore,
{
    pub fn new(sequences: Arc<S>, enrollments: Arc<L>) -> Self {
        Self {
            sequences,
            enrollments,
            server_start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.server_start_time.elapsed().as_secs()
    }
}

// Manual impl: the stores themselves need not be Clone
impl<S, L> Clone for AppState<S, L>
where
    S: SequenceStore,
    L: EnrollmentStore,
{
    fn clone(&self) -> Self {
        Self {
            sequences: Arc::clone(&self.sequences),
            enrollments: Arc::clone(&self.enrollments),
            server_start_time: self.server_start_time,
        }
    }
}
