//! SendGrid email delivery adapter

use async_trait::async_trait;
use serde_json::json;

use shared::SharedResult;

use crate::services::{classify_http_failure, require_env};
use crate::traits::{DeliveryError, DeliveryReceipt, EmailSender};

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// SendGrid credentials and sending identity
#[derive(Clone, Debug)]
pub struct SendGridConfig {
    pub api_key: String,
    pub from_email: String,
}

impl SendGridConfig {
    /// Load from `SENDGRID_API_KEY` and `SENDGRID_FROM_EMAIL`
    pub fn from_env() -> SharedResult<Self> {
        Ok(Self {
            api_key: require_env("SENDGRID_API_KEY")?,
            from_email: require_env("SENDGRID_FROM_EMAIL")?,
        })
    }
}

/// Email sender backed by the SendGrid v3 mail/send API
pub struct SendGridEmailSender {
    config: SendGridConfig,
    client: reqwest::Client,
}

impl SendGridEmailSender {
    pub fn new(config: SendGridConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmailSender for SendGridEmailSender {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let payload = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.config.from_email },
            "subject": subject,
            "content": [{ "type": "text/html", "value": body }],
        });

        let response = self
            .client
            .post(SENDGRID_URL)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| DeliveryError::Transient {
                message: format!("sendgrid request failed: {err}"),
            })?;

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .headers()
                .get("X-Message-Id")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            return Ok(DeliveryReceipt { message_id });
        }

        let detail = response.text().await.unwrap_or_default();
        Err(classify_http_failure(status, detail))
    }
}
