//! Trait definitions with mockall annotations for testing
//!
//! Capability interfaces consumed by the sequencer engine: the two channel
//! senders and the two persistence collaborators. The engine is responsible
//! for not dispatching a touch twice; the senders only promise to attempt a
//! delivery and classify the failure.

use chrono::{DateTime, Utc};
use shared::{LeadEnrollment, SequenceDefinition, SequenceId, TenantId};

use crate::error::SequencerResult;

/// Proof that a sender accepted a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider-assigned message identifier, when the provider returns one
    pub message_id: Option<String>,
}

/// Delivery failure, classified by whether a retry can succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network error, timeout, rate limit - retried with backoff
    Transient { message: String },
    /// Invalid recipient, revoked credential - never retried
    Permanent { message: String },
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Transient { message } => write!(f, "transient: {message}"),
            DeliveryError::Permanent { message } => write!(f, "permanent: {message}"),
        }
    }
}

/// Versioned snapshot of an enrollment as read from the state store
///
/// The version guards the compare-and-swap write-back; a stale version means
/// another evaluation (or a cancellation) got there first.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedEnrollment {
    pub enrollment: LeadEnrollment,
    pub version: u64,
}

/// Email delivery capability
#[mockall::automock]
#[async_trait::async_trait]
pub trait EmailSender: Send + Sync {
    /// Attempt one email delivery
    ///
    /// # Returns
    /// A receipt on acceptance, or a classified `DeliveryError`
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Direct-message delivery capability (WhatsApp or similar)
#[mockall::automock]
#[async_trait::async_trait]
pub trait MessageSender: Send + Sync {
    /// Attempt one message delivery
    ///
    /// # Returns
    /// A receipt on acceptance, or a classified `DeliveryError`
    async fn send_message(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Persistence collaborator for sequence definitions
#[mockall::automock]
#[async_trait::async_trait]
pub trait SequenceStore: Send + Sync {
    /// Fetch one definition by id
    async fn fetch_definition(
        &self,
        sequence_id: &SequenceId,
    ) -> SequencerResult<Option<SequenceDefinition>>;

    /// Fetch all active definitions owned by a tenant
    async fn fetch_active_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> SequencerResult<Vec<SequenceDefinition>>;

    /// Create or replace a definition; validates the touch invariants
    async fn upsert_definition(&self, definition: SequenceDefinition) -> SequencerResult<()>;
}

/// Persistence collaborator for lead enrollments
///
/// `update` is a compare-and-swap keyed on the snapshot version; this is the
/// enforcement point of the at-most-once dispatch guarantee.
#[mockall::automock]
#[async_trait::async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Insert a freshly created enrollment at version 1
    async fn insert(&self, enrollment: LeadEnrollment) -> SequencerResult<()>;

    /// Fetch the current versioned snapshot of an enrollment
    async fn get(
        &self,
        enrollment_id: &shared::EnrollmentId,
    ) -> SequencerResult<Option<VersionedEnrollment>>;

    /// Write back a mutated enrollment if and only if the stored version
    /// still matches `expected_version`
    ///
    /// # Returns
    /// `SequencerError::VersionConflict` when another writer won the race
    async fn update(
        &self,
        enrollment: LeadEnrollment,
        expected_version: u64,
    ) -> SequencerResult<()>;

    /// Fetch enrollments whose `next_fire_at` is at or before `before`,
    /// oldest first, bounded by `limit`
    async fn fetch_due_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> SequencerResult<Vec<VersionedEnrollment>>;
}
