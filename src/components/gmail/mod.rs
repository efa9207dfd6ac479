use crate::components::confirmation::token::DEFAULT_VALIDITY_HOURS;
use crate::components::confirmation::LinkDelivery;
use crate::components::google_calendar::GoogleAuth;
use crate::error::{gmail_error, AppResult};
use crate::models::EventPayload;
use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine as _,
};
use reqwest::Client;
use serde_json::json;
use tracing::info;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Delivers confirmation links by email through the Gmail API
#[derive(Clone)]
pub struct GmailDelivery {
    auth: GoogleAuth,
    client: Client,
    api_base: String,
    link_validity_hours: i64,
}

impl GmailDelivery {
    pub fn new(auth: GoogleAuth) -> Self {
        Self {
            auth,
            client: Client::new(),
            api_base: GMAIL_API_BASE.to_string(),
            link_validity_hours: DEFAULT_VALIDITY_HOURS,
        }
    }

    /// Lifetime of the links being sent, mentioned in the message
    pub fn with_link_validity_hours(mut self, hours: i64) -> Self {
        self.link_validity_hours = hours;
        self
    }

    /// Point the client at another API root (tests)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LinkDelivery for GmailDelivery {
    async fn deliver(&self, destination: &str, url: &str, payload: &EventPayload) -> AppResult<()> {
        let access_token = self.auth.access_token().await?;
        let message = build_message(destination, url, payload, self.link_validity_hours);

        let response = self
            .client
            .post(format!("{}/users/me/messages/send", self.api_base))
            .bearer_auth(access_token)
            .json(&json!({ "raw": URL_SAFE.encode(message) }))
            .send()
            .await
            .map_err(|e| gmail_error(&format!("Failed to send message: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(gmail_error(&format!(
                "Failed to send message: HTTP {} - {}",
                status, error_body
            )));
        }

        info!("Confirmation email sent to {}", destination);
        Ok(())
    }
}

/// Plain-text RFC 822 message asking the recipient to confirm `payload`
pub fn build_message(
    destination: &str,
    url: &str,
    payload: &EventPayload,
    validity_hours: i64,
) -> String {
    let subject = encode_header(&format!("Confirm event: {}", payload.title));
    let mut body = format!("We found this event:\r\n\r\n{}\r\n", single_line(&payload.title));
    for line in payload.summary_lines() {
        body.push_str(&single_line(&line));
        body.push_str("\r\n");
    }
    body.push_str("\r\nAdd it to your calendar:\r\n");
    body.push_str(url);
    body.push_str(&format!(
        "\r\n\r\nThe link expires in {} hours.\r\n",
        validity_hours
    ));

    format!(
        "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
        single_line(destination),
        subject,
        body
    )
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn encode_header(value: &str) -> String {
    let value = single_line(value);
    if value.is_ascii() {
        value
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}
