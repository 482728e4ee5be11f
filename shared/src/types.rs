//! Core shared types and identifiers

use crate::errors::{SharedError, SharedResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for tenants
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> SharedResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| SharedError::InvalidUuid { input: s.to_string() })
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for leads
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(Uuid);

impl LeadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> SharedResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| SharedError::InvalidUuid { input: s.to_string() })
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for sequence definitions
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceId(Uuid);

impl SequenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> SharedResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| SharedError::InvalidUuid { input: s.to_string() })
    }
}

impl Default for SequenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for lead enrollments
///
/// Ordered so it can participate in the due-time index key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnrollmentId(Uuid);

impl EnrollmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> SharedResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| SharedError::InvalidUuid { input: s.to_string() })
    }
}

impl Default for EnrollmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnrollmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery channel for a touch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Email,
    Messaging,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => write!(f, "email"),
            Channel::Messaging => write!(f, "messaging"),
        }
    }
}

/// Single touch-point within a sequence definition
///
/// Immutable once the definition is stored. The offset is measured from the
/// enrollment start, not from the previous touch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Touch {
    pub offset_hours: u32,
    pub channel: Channel,
    pub template: String,
    /// Email subject line template; ignored for messaging touches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl Touch {
    pub fn offset(&self) -> Duration {
        Duration::hours(self.offset_hours as i64)
    }
}

/// Named outreach sequence owned by a tenant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceDefinition {
    pub id: SequenceId,
    pub tenant_id: TenantId,
    pub name: String,
    pub touches: Vec<Touch>,
    pub is_active: bool,
}

impl SequenceDefinition {
    /// Validate the definition invariants: at least one touch, offsets
    /// strictly increasing. Rejected at definition time so the engine never
    /// sees a malformed sequence.
    pub fn validate(&self) -> SharedResult<()> {
        if self.touches.is_empty() {
            return Err(SharedError::EmptyTouchList {
                sequence_id: self.id.to_string(),
            });
        }

        for (index, window) in self.touches.windows(2).enumerate() {
            if window[1].offset_hours <= window[0].offset_hours {
                return Err(SharedError::NonIncreasingOffsets {
                    sequence_id: self.id.to_string(),
                    index: index + 1,
                });
            }
        }

        Ok(())
    }
}

/// Loosely-typed lead data used for template substitution and destination
/// lookup
///
/// Well-known keys are validated at enrollment time; unknown keys are
/// preserved for substitution but not relied upon elsewhere.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadProfile {
    pub fields: HashMap<String, String>,
}

impl LeadProfile {
    pub const KEY_NAME: &'static str = "name";
    pub const KEY_EMAIL: &'static str = "email";
    pub const KEY_PHONE: &'static str = "phone";
    pub const KEY_COMPANY: &'static str = "company";
    pub const KEY_INDUSTRY: &'static str = "industry";

    pub fn new(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn email(&self) -> Option<&str> {
        self.get(Self::KEY_EMAIL)
    }

    pub fn phone(&self) -> Option<&str> {
        self.get(Self::KEY_PHONE)
    }

    /// Destination address for a channel, if the lead has one
    pub fn destination_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Email => self.email(),
            Channel::Messaging => self.phone(),
        }
    }

    /// Enrollment-time validation: a lead must be reachable on at least one
    /// channel
    pub fn validate(&self, lead_id: &LeadId) -> SharedResult<()> {
        if self.email().is_none() && self.phone().is_none() {
            return Err(SharedError::MissingContactMethod {
                lead_id: lead_id.to_string(),
            });
        }
        Ok(())
    }
}

/// Lifecycle status of a lead enrollment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl EnrollmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnrollmentStatus::Completed | EnrollmentStatus::Failed | EnrollmentStatus::Cancelled
        )
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrollmentStatus::Pending => write!(f, "pending"),
            EnrollmentStatus::InProgress => write!(f, "in_progress"),
            EnrollmentStatus::Completed => write!(f, "completed"),
            EnrollmentStatus::Failed => write!(f, "failed"),
            EnrollmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one dispatch attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchOutcome {
    Sent,
    Skipped,
    FailedRetryable,
    FailedPermanent,
}

/// Append-only audit entry for one dispatch attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub touch_index: usize,
    pub attempted_at: DateTime<Utc>,
    pub outcome: DispatchOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One lead's progress through one sequence instance
///
/// Mutated only by the sequencer engine (and external cancellation); the
/// engine operates on a versioned snapshot and writes back via compare-and-
/// swap, so `next_fire_at` doubles as the durable due-time index key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeadEnrollment {
    pub id: EnrollmentId,
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub sequence_id: SequenceId,
    pub profile: LeadProfile,
    pub started_at: DateTime<Utc>,
    pub status: EnrollmentStatus,
    /// Index of the last touch that was SENT or SKIPPED; `None` before the
    /// first touch completes. Only ever increases.
    pub last_completed_touch: Option<usize>,
    pub dispatch_log: Vec<DispatchRecord>,
    /// When this enrollment next needs evaluation; `None` in terminal states
    pub next_fire_at: Option<DateTime<Utc>>,
}

impl LeadEnrollment {
    /// Enroll a lead into a sequence, validating both sides
    pub fn enroll(
        lead_id: LeadId,
        definition: &SequenceDefinition,
        profile: LeadProfile,
        now: DateTime<Utc>,
    ) -> SharedResult<Self> {
        definition.validate()?;
        if !definition.is_active {
            return Err(SharedError::InactiveSequence {
                sequence_id: definition.id.to_string(),
            });
        }
        profile.validate(&lead_id)?;

        let first_due = now + definition.touches[0].offset();
        Ok(Self {
            id: EnrollmentId::new(),
            tenant_id: definition.tenant_id.clone(),
            lead_id,
            sequence_id: definition.id.clone(),
            profile,
            started_at: now,
            status: EnrollmentStatus::Pending,
            last_completed_touch: None,
            dispatch_log: Vec::new(),
            next_fire_at: Some(first_due),
        })
    }

    /// Index of the next touch to dispatch
    pub fn next_touch_index(&self) -> usize {
        self.last_completed_touch.map_or(0, |i| i + 1)
    }

    /// Number of retryable failures recorded for a touch since it was last
    /// sent; drives the backoff schedule
    pub fn retryable_attempts(&self, touch_index: usize) -> u32 {
        self.dispatch_log
            .iter()
            .rev()
            .take_while(|record| {
                !(record.touch_index == touch_index && record.outcome == DispatchOutcome::Sent)
            })
            .filter(|record| {
                record.touch_index == touch_index
                    && record.outcome == DispatchOutcome::FailedRetryable
            })
            .count() as u32
    }

    /// Append a dispatch record to the audit log
    pub fn record(&mut self, record: DispatchRecord) {
        self.dispatch_log.push(record);
    }
}
