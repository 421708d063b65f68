//! WhatsApp webhook: verification handshake and inbound messages

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::store::messages::InboundMessage;
use crate::store::StoreError;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Subscription handshake: echo the challenge when the token matches
pub async fn verify_handler(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<String, WebhookError> {
    let config = state
        .config
        .whatsapp
        .as_ref()
        .ok_or(WebhookError::NotConfigured)?;

    check_subscription(&params, &config.verify_token)
}

fn check_subscription(params: &VerifyParams, verify_token: &str) -> Result<String, WebhookError> {
    if params.mode.as_deref() != Some("subscribe")
        || params.verify_token.as_deref() != Some(verify_token)
    {
        warn!("WhatsApp webhook verification rejected");
        return Err(WebhookError::VerificationFailed);
    }
    params
        .challenge
        .clone()
        .ok_or(WebhookError::InvalidPayload)
}

/// Handle inbound message notifications
pub async fn inbound_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookError> {
    let config = state
        .config
        .whatsapp
        .as_ref()
        .ok_or(WebhookError::NotConfigured)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    verify_signature(&body, signature, &config.app_secret)?;

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        error!(error = %e, "Failed to parse WhatsApp webhook payload");
        WebhookError::InvalidPayload
    })?;

    let mut stored = 0usize;
    for incoming in payload.messages() {
        let customer = state.customers.find_by_phone(&incoming.from).await?;
        let is_new = state
            .messages
            .record_inbound(InboundMessage {
                external_id: incoming.id.clone(),
                phone: incoming.from.clone(),
                body: incoming.body_text(),
                customer_id: customer.as_ref().map(|c| c.id),
                sent_at: incoming.sent_at(),
            })
            .await?;

        if is_new {
            stored += 1;
        } else {
            info!(message_id = %incoming.id, "Duplicate WhatsApp delivery (idempotent)");
        }
    }

    info!(stored, "Processed WhatsApp webhook");
    Ok(StatusCode::OK)
}

/// Check `sha256=<hex>` against HMAC-SHA256 of the raw body
pub fn verify_signature(payload: &[u8], header: &str, secret: &str) -> Result<(), WebhookError> {
    let provided = header
        .strip_prefix("sha256=")
        .and_then(|h| hex::decode(h.trim()).ok())
        .ok_or(WebhookError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(payload);
    mac.verify_slice(&provided)
        .map_err(|_| WebhookError::InvalidSignature)
}

// ============================================================================
// Cloud API payload
// ============================================================================

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    value: ChangeValue,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    /// Absent on delivery status notifications
    #[serde(default)]
    messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    id: String,
    from: String,
    /// Unix seconds, sent as a string
    timestamp: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    text: Option<IncomingText>,
}

#[derive(Debug, Deserialize)]
struct IncomingText {
    body: String,
}

impl WebhookPayload {
    fn messages(&self) -> impl Iterator<Item = &IncomingMessage> {
        self.entry
            .iter()
            .flat_map(|e| &e.changes)
            .flat_map(|c| &c.value.messages)
    }
}

impl IncomingMessage {
    fn body_text(&self) -> String {
        match &self.text {
            Some(text) if !text.body.trim().is_empty() => text.body.clone(),
            _ => format!("[{}]", self.kind),
        }
    }

    fn sent_at(&self) -> DateTime<Utc> {
        self.timestamp
            .as_deref()
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("WhatsApp is not configured")]
    NotConfigured,

    #[error("Missing X-Hub-Signature-256 header")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid request payload")]
    InvalidPayload,

    #[error("Webhook verification failed")]
    VerificationFailed,

    #[error("Database error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            WebhookError::NotConfigured => StatusCode::NOT_FOUND,
            WebhookError::MissingSignature => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidPayload => StatusCode::BAD_REQUEST,
            WebhookError::VerificationFailed => StatusCode::FORBIDDEN,
            WebhookError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
