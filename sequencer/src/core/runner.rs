//! Batch tick driver
//!
//! The engine is driven by an external periodic trigger. Each tick fetches
//! the enrollments whose fire time has arrived and evaluates them
//! concurrently; one enrollment failing never aborts the tick for the
//! others. Only the due-fetch itself is fatal to a tick.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::core::engine::{Evaluation, SequencerEngine};
use crate::error::SequencerResult;
use crate::traits::{EmailSender, EnrollmentStore, MessageSender, SequenceStore};

/// Per-tick observability summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub evaluated: usize,
    pub dispatched: usize,
    pub retried: usize,
    pub failed: usize,
    pub completed: usize,
    pub skipped: usize,
    pub conflicts: usize,
}

impl TickSummary {
    fn absorb(&mut self, evaluation: &Evaluation) {
        match evaluation {
            Evaluation::Dispatched { .. } => self.dispatched += 1,
            Evaluation::Retry { .. } => self.retried += 1,
            Evaluation::Failed { .. } => self.failed += 1,
            Evaluation::Completed => self.completed += 1,
            Evaluation::SkippedTouch { .. } => self.skipped += 1,
            Evaluation::Conflict => self.conflicts += 1,
            Evaluation::Noop | Evaluation::NotDue { .. } | Evaluation::Cancelled => {}
        }
    }
}

/// Runs one evaluation pass over all due enrollments
pub struct TickRunner<E, M, S, L>
where
    E: EmailSender,
    M: MessageSender,
    S: SequenceStore,
    L: EnrollmentStore,
{
    engine: SequencerEngine<E, M, S, L>,
}

impl<E, M, S, L> TickRunner<E, M, S, L>
where
    E: EmailSender,
    M: MessageSender,
    S: SequenceStore,
    L: EnrollmentStore,
{
    pub fn new(engine: SequencerEngine<E, M, S, L>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SequencerEngine<E, M, S, L> {
        &self.engine
    }

    /// Evaluate every enrollment due at `now`
    ///
    /// Store unavailability on the due-fetch is the only error that escapes;
    /// per-enrollment failures are logged and counted.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> SequencerResult<TickSummary> {
        let batch_size = self.engine.config().tick_batch_size;
        let due = self
            .engine
            .enrollment_store()
            .fetch_due_before(now, batch_size)
            .await?;

        let mut summary = TickSummary {
            evaluated: due.len(),
            ..TickSummary::default()
        };

        let evaluations = join_all(
            due.into_iter()
                .map(|snapshot| self.engine.evaluate(snapshot, now)),
        )
        .await;

        for result in evaluations {
            match result {
                Ok(evaluation) => summary.absorb(&evaluation),
                Err(err) => {
                    // Isolated: one bad enrollment must not stall the batch
                    error!(error = %err, "Enrollment evaluation failed");
                    summary.failed += 1;
                }
            }
        }

        if summary.evaluated > 0 {
            info!(
                evaluated = summary.evaluated,
                dispatched = summary.dispatched,
                retried = summary.retried,
                failed = summary.failed,
                completed = summary.completed,
                skipped = summary.skipped,
                conflicts = summary.conflicts,
                "Tick complete"
            );
        }

        Ok(summary)
    }
}
