//! Shared fixtures and scripted senders for the sequencer test suites

// Not every suite uses every fixture
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use sequencer::services::{InMemoryEnrollmentStore, InMemorySequenceStore};
use sequencer::traits::{
    DeliveryError, DeliveryReceipt, EmailSender, EnrollmentStore, MessageSender,
    VersionedEnrollment,
};
use shared::{
    Channel, EnrollmentId, LeadEnrollment, LeadId, LeadProfile, SequenceDefinition, SequenceId,
    TenantId, Touch,
};

/// One message captured by a scripted sender
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: String,
    pub subject: Option<String>,
    pub body: String,
}

/// Email sender that records every call and replays scripted results
/// (defaults to success once the script runs out)
#[derive(Clone)]
pub struct ScriptedEmailSender {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    responses: Arc<Mutex<VecDeque<Result<DeliveryReceipt, DeliveryError>>>>,
}

impl ScriptedEmailSender {
    pub fn always_ok() -> Self {
        Self::with_responses(Vec::new())
    }

    pub fn with_responses(responses: Vec<Result<DeliveryReceipt, DeliveryError>>) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(responses.into())),
        }
    }

    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl EmailSender for ScriptedEmailSender {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        self.sent.lock().await.push(SentMessage {
            to: to.to_string(),
            subject: Some(subject.to_string()),
            body: body.to_string(),
        });
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| {
                Ok(DeliveryReceipt {
                    message_id: Some("stub-email".to_string()),
                })
            })
    }
}

/// Message sender counterpart of [`ScriptedEmailSender`]
#[derive(Clone)]
pub struct ScriptedMessageSender {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    responses: Arc<Mutex<VecDeque<Result<DeliveryReceipt, DeliveryError>>>>,
}

impl ScriptedMessageSender {
    pub fn always_ok() -> Self {
        Self::with_responses(Vec::new())
    }

    pub fn with_responses(responses: Vec<Result<DeliveryReceipt, DeliveryError>>) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(responses.into())),
        }
    }

    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl MessageSender for ScriptedMessageSender {
    async fn send_message(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        self.sent.lock().await.push(SentMessage {
            to: to.to_string(),
            subject: None,
            body: body.to_string(),
        });
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| {
                Ok(DeliveryReceipt {
                    message_id: Some("stub-message".to_string()),
                })
            })
    }
}

/// Email sender that stalls longer than any sane dispatch timeout
#[derive(Clone)]
pub struct SlowEmailSender {
    pub delay: std::time::Duration,
}

#[async_trait]
impl EmailSender for SlowEmailSender {
    async fn send_email(
        &self,
        _to: &str,
        _subject: &str,
        _body: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        tokio::time::sleep(self.delay).await;
        Ok(DeliveryReceipt { message_id: None })
    }
}

pub fn transient(message: &str) -> Result<DeliveryReceipt, DeliveryError> {
    Err(DeliveryError::Transient {
        message: message.to_string(),
    })
}

pub fn permanent(message: &str) -> Result<DeliveryReceipt, DeliveryError> {
    Err(DeliveryError::Permanent {
        message: message.to_string(),
    })
}

/// Build a definition from `(offset_hours, channel)` pairs
pub fn definition_with(tenant_id: TenantId, touches: &[(u32, Channel)]) -> SequenceDefinition {
    SequenceDefinition {
        id: SequenceId::new(),
        tenant_id,
        name: "outreach".to_string(),
        touches: touches
            .iter()
            .map(|(offset_hours, channel)| Touch {
                offset_hours: *offset_hours,
                channel: *channel,
                template: "Hi {{name}}, from {{company}}".to_string(),
                subject: Some("Grow with {{company}}".to_string()),
            })
            .collect(),
        is_active: true,
    }
}

/// The three-touch sequence used throughout the scenario tests:
/// email at 0h, email at 48h, messaging at 144h
pub fn scenario_definition(tenant_id: TenantId) -> SequenceDefinition {
    definition_with(
        tenant_id,
        &[
            (0, Channel::Email),
            (48, Channel::Email),
            (144, Channel::Messaging),
        ],
    )
}

/// Lead profile with optional contact methods and the well-known fields
/// filled in
pub fn profile(email: Option<&str>, phone: Option<&str>) -> LeadProfile {
    let mut fields = HashMap::new();
    fields.insert("name".to_string(), "Sarah".to_string());
    fields.insert("company".to_string(), "Acme".to_string());
    if let Some(email) = email {
        fields.insert("email".to_string(), email.to_string());
    }
    if let Some(phone) = phone {
        fields.insert("phone".to_string(), phone.to_string());
    }
    LeadProfile::new(fields)
}

/// Seed the stores with a definition and a fresh enrollment, returning the
/// enrollment id
pub async fn seed_enrollment(
    sequences: &InMemorySequenceStore,
    enrollments: &InMemoryEnrollmentStore,
    definition: SequenceDefinition,
    lead_profile: LeadProfile,
    started_at: chrono::DateTime<chrono::Utc>,
) -> EnrollmentId {
    use sequencer::traits::SequenceStore;

    sequences
        .upsert_definition(definition.clone())
        .await
        .unwrap();
    let enrollment =
        LeadEnrollment::enroll(LeadId::new(), &definition, lead_profile, started_at).unwrap();
    let id = enrollment.id.clone();
    enrollments.insert(enrollment).await.unwrap();
    id
}

/// Fetch the current versioned snapshot, panicking if the enrollment is gone
pub async fn snapshot(
    enrollments: &InMemoryEnrollmentStore,
    id: &EnrollmentId,
) -> VersionedEnrollment {
    enrollments.get(id).await.unwrap().expect("enrollment missing")
}
