//! Outbound WhatsApp text messages

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::WhatsAppConfig;
use crate::util::rate_limit::{create_limiter, Limiter, WHATSAPP_SEND_RATE_LIMIT};

/// Mexican country code, prefixed to bare 10-digit numbers
const DEFAULT_COUNTRY_CODE: &str = "52";

/// Digits-only international number, or `None` if too short to dial
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        10 => Some(format!("{DEFAULT_COUNTRY_CODE}{digits}")),
        11..=15 => Some(digits),
        _ => None,
    }
}

#[derive(Clone)]
pub struct WhatsAppClient {
    client: Client,
    api_url: String,
    phone_number_id: String,
    access_token: String,
    limiter: Arc<Limiter>,
}

impl WhatsAppClient {
    pub fn new(config: &WhatsAppConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            phone_number_id: config.phone_number_id.clone(),
            access_token: config.access_token.clone(),
            limiter: create_limiter(WHATSAPP_SEND_RATE_LIMIT),
        }
    }

    /// Send a plain text message; returns the WhatsApp message id
    pub async fn send_text(&self, to: &str, body: &str) -> Result<String, WhatsAppError> {
        let to = normalize_phone(to).ok_or_else(|| WhatsAppError::InvalidPhone(to.to_string()))?;

        if self.limiter.check().is_err() {
            warn!("WhatsApp send rate limit reached");
            return Err(WhatsAppError::RateLimited);
        }

        let request = SendTextRequest {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: &to,
            kind: "text",
            text: TextBody {
                preview_url: false,
                body,
            },
        };

        let response = self
            .client
            .post(format!("{}/{}/messages", self.api_url, self.phone_number_id))
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WhatsAppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let sent: SendTextResponse = response.json().await?;
        let id = sent
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or(WhatsAppError::MissingMessageId)?;

        info!(message_id = %id, "WhatsApp message sent");
        Ok(id)
    }
}

#[derive(Serialize)]
struct SendTextRequest<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Serialize)]
struct TextBody<'a> {
    preview_url: bool,
    body: &'a str,
}

#[derive(Deserialize)]
struct SendTextResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    #[error("WhatsApp is not configured")]
    NotConfigured,

    #[error("Phone number '{0}' cannot receive WhatsApp messages")]
    InvalidPhone(String),

    #[error("Too many WhatsApp messages, try again shortly")]
    RateLimited,

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("WhatsApp API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("WhatsApp API returned no message id")]
    MissingMessageId,
}
