//! Twilio WhatsApp delivery adapter

use async_trait::async_trait;

use shared::SharedResult;

use crate::services::{classify_http_failure, require_env};
use crate::traits::{DeliveryError, DeliveryReceipt, MessageSender};

/// Twilio credentials and WhatsApp sending number
#[derive(Clone, Debug)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub whatsapp_number: String,
}

impl TwilioConfig {
    /// Load from `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, and
    /// `TWILIO_WHATSAPP_NUMBER`
    pub fn from_env() -> SharedResult<Self> {
        Ok(Self {
            account_sid: require_env("TWILIO_ACCOUNT_SID")?,
            auth_token: require_env("TWILIO_AUTH_TOKEN")?,
            whatsapp_number: require_env("TWILIO_WHATSAPP_NUMBER")?,
        })
    }
}

/// Message sender backed by the Twilio Messages API, addressing recipients
/// over WhatsApp
pub struct TwilioMessageSender {
    config: TwilioConfig,
    client: reqwest::Client,
}

impl TwilioMessageSender {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        )
    }
}

#[async_trait]
impl MessageSender for TwilioMessageSender {
    async fn send_message(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        let params = [
            ("From", format!("whatsapp:{}", self.config.whatsapp_number)),
            ("To", format!("whatsapp:{to}")),
            ("Body", body.to_string()),
        ];

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|err| DeliveryError::Transient {
                message: format!("twilio request failed: {err}"),
            })?;

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|value| value.get("sid").and_then(|sid| sid.as_str()).map(str::to_string));
            return Ok(DeliveryReceipt { message_id });
        }

        let detail = response.text().await.unwrap_or_default();
        Err(classify_http_failure(status, detail))
    }
}
