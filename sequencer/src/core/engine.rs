//! Sequencer engine state machine
//!
//! Evaluates one enrollment at a time: decides which touch is due, renders
//! and dispatches it at most once, advances the enrollment state, and
//! persists the next fire time. All writes go through the enrollment store's
//! compare-and-swap, and a claim is taken before any dispatch so concurrent
//! evaluations of the same enrollment cannot double-send.

use std::cmp;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use shared::{
    Channel, DispatchOutcome, DispatchRecord, EnrollmentStatus, LeadEnrollment,
    SequenceDefinition, Touch,
};

use crate::config::EngineConfig;
use crate::core::template;
use crate::error::{SequencerError, SequencerResult};
use crate::traits::{
    DeliveryError, EmailSender, EnrollmentStore, MessageSender, SequenceStore,
    VersionedEnrollment,
};

/// Result of evaluating one enrollment once
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Enrollment already terminal; state and log untouched
    Noop,
    /// Another writer won the version race; this evaluation was discarded
    Conflict,
    /// Enrollment cancelled because its sequence was deactivated
    Cancelled,
    /// Next touch not yet due
    NotDue { next_check_at: DateTime<Utc> },
    /// Exactly one touch was dispatched
    Dispatched {
        touch_index: usize,
        next_check_at: Option<DateTime<Utc>>,
    },
    /// Touch skipped: the lead has no destination for its channel
    SkippedTouch {
        touch_index: usize,
        next_check_at: Option<DateTime<Utc>>,
    },
    /// Transient delivery failure, retry scheduled with backoff
    Retry {
        touch_index: usize,
        retry_at: DateTime<Utc>,
    },
    /// Permanent delivery failure or exhausted retries; enrollment failed
    Failed { touch_index: usize },
    /// All touches sent or skipped
    Completed,
}

/// Outcome of one dispatch attempt before it is applied to the enrollment
enum DispatchAttempt {
    Sent { message_id: Option<String> },
    Skip,
    Transient { message: String },
    Permanent { message: String },
}

/// The sequencer engine, generic over its injected capabilities
pub struct SequencerEngine<E, M, S, L>
where
    E: EmailSender,
    M: MessageSender,
    S: SequenceStore,
    L: EnrollmentStore,
{
    email: E,
    messenger: M,
    sequences: S,
    enrollments: L,
    config: EngineConfig,
}

impl<E, M, S, L> SequencerEngine<E, M, S, L>
where
    E: EmailSender,
    M: MessageSender,
    S: SequenceStore,
    L: EnrollmentStore,
{
    /// Create a new engine with injected dependencies
    pub fn new(email: E, messenger: M, sequences: S, enrollments: L, config: EngineConfig) -> Self {
        Self {
            email,
            messenger,
            sequences,
            enrollments,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn enrollment_store(&self) -> &L {
        &self.enrollments
    }

    /// Evaluate one enrollment snapshot at `now`
    ///
    /// At most one touch is dispatched per call, even when several are
    /// overdue, keeping audit-log granularity at one touch per tick.
    pub async fn evaluate(
        &self,
        snapshot: VersionedEnrollment,
        now: DateTime<Utc>,
    ) -> SequencerResult<Evaluation> {
        let VersionedEnrollment {
            mut enrollment,
            version,
        } = snapshot;

        // Terminal enrollments are tolerated, not errors: the polling loop
        // may race with cancellation.
        if enrollment.status.is_terminal() {
            return Ok(Evaluation::Noop);
        }

        let definition = self
            .sequences
            .fetch_definition(&enrollment.sequence_id)
            .await?
            .ok_or_else(|| SequencerError::UnknownSequence {
                sequence_id: enrollment.sequence_id.to_string(),
            })?;

        // Tenant-side deactivation cancels outstanding enrollments before
        // any further dispatch.
        if !definition.is_active {
            enrollment.status = EnrollmentStatus::Cancelled;
            enrollment.next_fire_at = None;
            info!(
                enrollment_id = %enrollment.id,
                sequence_id = %enrollment.sequence_id,
                "Cancelling enrollment: sequence deactivated"
            );
            return self
                .commit(enrollment, version, Evaluation::Cancelled)
                .await;
        }

        let next_index = enrollment.next_touch_index();
        if next_index >= definition.touches.len() {
            enrollment.status = EnrollmentStatus::Completed;
            enrollment.next_fire_at = None;
            info!(enrollment_id = %enrollment.id, "✅ Enrollment completed");
            return self
                .commit(enrollment, version, Evaluation::Completed)
                .await;
        }

        let touch = definition.touches[next_index].clone();

        // A pending retry or an in-flight claim pushes the due time past the
        // touch offset.
        let mut due_at = enrollment.started_at + touch.offset();
        if let Some(next_fire) = enrollment.next_fire_at {
            due_at = cmp::max(due_at, next_fire);
        }

        if now < due_at {
            if enrollment.next_fire_at != Some(due_at) {
                enrollment.next_fire_at = Some(due_at);
                return self
                    .commit(
                        enrollment,
                        version,
                        Evaluation::NotDue {
                            next_check_at: due_at,
                        },
                    )
                    .await;
            }
            return Ok(Evaluation::NotDue {
                next_check_at: due_at,
            });
        }

        // Claim before dispatching: push the fire time forward so any
        // concurrent evaluation of the same snapshot fails its CAS and backs
        // off. This is the at-most-once enforcement point.
        enrollment.next_fire_at = Some(now + self.config.claim_window());
        match self.enrollments.update(enrollment.clone(), version).await {
            Ok(()) => {}
            Err(err) if err.is_conflict() => {
                debug!(
                    enrollment_id = %enrollment.id,
                    "Concurrent evaluation detected, discarding"
                );
                return Ok(Evaluation::Conflict);
            }
            Err(err) => return Err(err),
        }
        let claimed_version = version + 1;

        let attempt = match enrollment.profile.destination_for(touch.channel) {
            None => DispatchAttempt::Skip,
            Some(destination) => {
                let destination = destination.to_string();
                self.dispatch(&touch, &destination, &definition, &enrollment)
                    .await
            }
        };

        let evaluation = self.apply_attempt(&mut enrollment, &definition, next_index, attempt, now);

        match self
            .enrollments
            .update(enrollment.clone(), claimed_version)
            .await
        {
            Ok(()) => Ok(evaluation),
            Err(err) if err.is_conflict() => {
                self.merge_after_conflict(enrollment, claimed_version).await
            }
            Err(err) => Err(err),
        }
    }

    /// Perform one delivery attempt over the matching channel, bounded by
    /// the dispatch timeout
    async fn dispatch(
        &self,
        touch: &Touch,
        destination: &str,
        definition: &SequenceDefinition,
        enrollment: &LeadEnrollment,
    ) -> DispatchAttempt {
        let fields = &enrollment.profile.fields;
        let body = template::render(&touch.template, fields);

        let outcome = match touch.channel {
            Channel::Email => {
                let subject = touch
                    .subject
                    .as_deref()
                    .map(|subject| template::render(subject, fields))
                    .unwrap_or_else(|| definition.name.clone());
                timeout(
                    self.config.dispatch_timeout,
                    self.email.send_email(destination, &subject, &body),
                )
                .await
            }
            Channel::Messaging => timeout(
                self.config.dispatch_timeout,
                self.messenger.send_message(destination, &body),
            )
            .await,
        };

        match outcome {
            Ok(Ok(receipt)) => DispatchAttempt::Sent {
                message_id: receipt.message_id,
            },
            Ok(Err(DeliveryError::Transient { message })) => DispatchAttempt::Transient { message },
            Ok(Err(DeliveryError::Permanent { message })) => DispatchAttempt::Permanent { message },
            Err(_) => DispatchAttempt::Transient {
                message: format!(
                    "dispatch timed out after {:?}",
                    self.config.dispatch_timeout
                ),
            },
        }
    }

    /// Fold a dispatch attempt into the enrollment state
    fn apply_attempt(
        &self,
        enrollment: &mut LeadEnrollment,
        definition: &SequenceDefinition,
        touch_index: usize,
        attempt: DispatchAttempt,
        now: DateTime<Utc>,
    ) -> Evaluation {
        match attempt {
            DispatchAttempt::Sent { message_id } => {
                enrollment.record(DispatchRecord {
                    touch_index,
                    attempted_at: now,
                    outcome: DispatchOutcome::Sent,
                    detail: message_id,
                });
                enrollment.last_completed_touch = Some(touch_index);
                enrollment.status = EnrollmentStatus::InProgress;
                let next_check_at = self.schedule_next(enrollment, definition, touch_index, now);
                info!(
                    enrollment_id = %enrollment.id,
                    touch_index,
                    channel = %definition.touches[touch_index].channel,
                    "📨 Touch dispatched"
                );
                Evaluation::Dispatched {
                    touch_index,
                    next_check_at: Some(next_check_at),
                }
            }
            DispatchAttempt::Skip => {
                let channel = definition.touches[touch_index].channel;
                enrollment.record(DispatchRecord {
                    touch_index,
                    attempted_at: now,
                    outcome: DispatchOutcome::Skipped,
                    detail: Some(format!("lead has no {channel} destination")),
                });
                enrollment.last_completed_touch = Some(touch_index);
                let next_check_at = self.schedule_next(enrollment, definition, touch_index, now);
                info!(
                    enrollment_id = %enrollment.id,
                    touch_index,
                    channel = %channel,
                    "Touch skipped: no destination"
                );
                Evaluation::SkippedTouch {
                    touch_index,
                    next_check_at: Some(next_check_at),
                }
            }
            DispatchAttempt::Transient { message } => {
                enrollment.record(DispatchRecord {
                    touch_index,
                    attempted_at: now,
                    outcome: DispatchOutcome::FailedRetryable,
                    detail: Some(message.clone()),
                });
                let attempts = enrollment.retryable_attempts(touch_index);
                if self.config.retry.is_exhausted(attempts) {
                    enrollment.record(DispatchRecord {
                        touch_index,
                        attempted_at: now,
                        outcome: DispatchOutcome::FailedPermanent,
                        detail: Some(format!("retry budget exhausted after {attempts} attempts")),
                    });
                    enrollment.status = EnrollmentStatus::Failed;
                    enrollment.next_fire_at = None;
                    warn!(
                        enrollment_id = %enrollment.id,
                        touch_index,
                        attempts,
                        "❌ Enrollment failed: retries exhausted"
                    );
                    Evaluation::Failed { touch_index }
                } else {
                    let retry_at = now + self.config.retry.delay_for_attempt(attempts);
                    enrollment.next_fire_at = Some(retry_at);
                    debug!(
                        enrollment_id = %enrollment.id,
                        touch_index,
                        attempts,
                        retry_at = %retry_at,
                        error = %message,
                        "Transient delivery failure, retry scheduled"
                    );
                    Evaluation::Retry {
                        touch_index,
                        retry_at,
                    }
                }
            }
            DispatchAttempt::Permanent { message } => {
                enrollment.record(DispatchRecord {
                    touch_index,
                    attempted_at: now,
                    outcome: DispatchOutcome::FailedPermanent,
                    detail: Some(message.clone()),
                });
                enrollment.status = EnrollmentStatus::Failed;
                enrollment.next_fire_at = None;
                warn!(
                    enrollment_id = %enrollment.id,
                    touch_index,
                    error = %message,
                    "❌ Enrollment failed: permanent delivery error"
                );
                Evaluation::Failed { touch_index }
            }
        }
    }

    /// Compute and persist the next fire time after a touch was sent or
    /// skipped
    ///
    /// After the final touch the enrollment is made immediately due again so
    /// the following evaluation observes the out-of-range index and
    /// transitions to COMPLETED; no second dispatch happens in this call.
    fn schedule_next(
        &self,
        enrollment: &mut LeadEnrollment,
        definition: &SequenceDefinition,
        completed_index: usize,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let upcoming = completed_index + 1;
        let next_check_at = if upcoming < definition.touches.len() {
            enrollment.started_at + definition.touches[upcoming].offset()
        } else {
            now
        };
        enrollment.next_fire_at = Some(next_check_at);
        next_check_at
    }

    /// Single CAS write for the non-dispatch paths
    async fn commit(
        &self,
        enrollment: LeadEnrollment,
        expected_version: u64,
        evaluation: Evaluation,
    ) -> SequencerResult<Evaluation> {
        match self.enrollments.update(enrollment, expected_version).await {
            Ok(()) => Ok(evaluation),
            Err(err) if err.is_conflict() => Ok(Evaluation::Conflict),
            Err(err) => Err(err),
        }
    }

    /// The write-back after a dispatch lost its CAS. Only a cancellation can
    /// race in between claim and write-back, so preserve the terminal status
    /// but keep the audit records: the send did happen.
    async fn merge_after_conflict(
        &self,
        evaluated: LeadEnrollment,
        claimed_version: u64,
    ) -> SequencerResult<Evaluation> {
        let Some(fresh) = self.enrollments.get(&evaluated.id).await? else {
            warn!(enrollment_id = %evaluated.id, "Enrollment vanished during evaluation");
            return Ok(Evaluation::Conflict);
        };

        if !fresh.enrollment.status.is_terminal()
            || fresh.enrollment.dispatch_log.len() > evaluated.dispatch_log.len()
        {
            debug!(
                enrollment_id = %evaluated.id,
                claimed_version,
                "Unexpected writer during claim, discarding evaluation"
            );
            return Ok(Evaluation::Conflict);
        }

        let mut merged = fresh.enrollment.clone();
        let new_records = evaluated.dispatch_log[fresh.enrollment.dispatch_log.len()..].to_vec();
        merged.dispatch_log.extend(new_records);
        merged.next_fire_at = None;

        match self.enrollments.update(merged, fresh.version).await {
            Ok(()) => {
                debug!(
                    enrollment_id = %evaluated.id,
                    "Merged dispatch record onto cancelled enrollment"
                );
                Ok(Evaluation::Conflict)
            }
            Err(err) if err.is_conflict() => Ok(Evaluation::Conflict),
            Err(err) => Err(err),
        }
    }
}
