//! Service implementations
//!
//! Real implementations of the capability traits: versioned in-memory
//! stores with a sorted due-time index, and the SendGrid / Twilio delivery
//! adapters.

pub mod memory_store;
pub mod sendgrid;
pub mod twilio;

#[cfg(test)]
mod tests;

pub use memory_store::{InMemoryEnrollmentStore, InMemorySequenceStore};
pub use sendgrid::{SendGridConfig, SendGridEmailSender};
pub use twilio::{TwilioConfig, TwilioMessageSender};

use reqwest::StatusCode;
use shared::{SharedError, SharedResult};

use crate::traits::DeliveryError;

/// Classify a non-success provider response
///
/// Rate limits, request timeouts, and server-side errors are worth retrying;
/// every other client error (bad recipient, revoked credential) is final.
pub(crate) fn classify_http_failure(status: StatusCode, detail: String) -> DeliveryError {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        DeliveryError::Transient {
            message: format!("provider returned {status}: {detail}"),
        }
    } else {
        DeliveryError::Permanent {
            message: format!("provider returned {status}: {detail}"),
        }
    }
}

/// Read a required environment variable for a sender config
pub(crate) fn require_env(name: &str) -> SharedResult<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SharedError::InvalidConfig {
            field: name.to_string(),
            value: "<missing>".to_string(),
        })
}
