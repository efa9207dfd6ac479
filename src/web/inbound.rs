use super::auth::{webhook_secret, ApiError};
use super::AppState;
use crate::components::extraction::Extraction;
use crate::components::inbound_email::{
    mailbox_address, parse_email, verify_webhook_secret, EmailContent,
};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

/// Body posted by the email worker
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEmail {
    #[serde(default)]
    from: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    raw_email: Option<String>,
}

/// Extract events from a forwarded email and mail a confirmation link for each
pub async fn inbound_email_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(email): Json<InboundEmail>,
) -> Result<Json<Value>, ApiError> {
    if !verify_webhook_secret(
        webhook_secret(&headers),
        state.config.webhook_secret.as_deref(),
    ) {
        warn!("Invalid webhook secret");
        return Err(ApiError::InvalidWebhookSecret);
    }

    let raw_email = email
        .raw_email
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No email content provided".to_string()))?;

    if !state.senders.is_allowed(&email.from) {
        warn!("Sender not allowed: {}", email.from);
        return Err(ApiError::SenderNotAllowed);
    }

    info!("Processing email from: {}", email.from);
    let subject = email.subject.as_deref();

    let content =
        parse_email(raw_email).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let extractor = state
        .extractor
        .clone()
        .ok_or(ApiError::NotConfigured("ANTHROPIC_API_KEY"))?;

    let extraction = match &content {
        EmailContent::Image { image, .. } => extractor.extract_from_image(image, subject).await?,
        EmailContent::Text(text) => extractor.extract_from_text(text, subject).await?,
    };

    if let Extraction::NotFound { error, reason } = &extraction {
        info!("Could not extract event: {}", error);
        return Ok(Json(json!({
            "success": false,
            "message": "Could not identify event in email",
            "details": { "error": error, "reason": reason },
        })));
    }

    let payloads = match extraction.into_payloads() {
        Ok(payloads) => payloads,
        Err(e) => {
            warn!("Extracted event is incomplete: {}", e);
            return Ok(Json(json!({
                "success": false,
                "message": "Missing required event fields",
                "details": e.to_string(),
            })));
        }
    };

    let destination = mailbox_address(&email.from);
    let mut issued = 0;
    for payload in &payloads {
        match state.flow.issue_and_deliver(payload, &destination) {
            Ok(_) => issued += 1,
            Err(e) => error!("Failed to issue confirmation for \"{}\": {}", payload.title, e),
        }
    }

    let message = match payloads.as_slice() {
        [single] if issued == 1 => format!("Confirmation link for \"{}\" sent", single.title),
        _ => format!("Confirmation links for {} events sent", issued),
    };

    Ok(Json(json!({
        "success": issued > 0,
        "message": message,
        "count": issued,
    })))
}
