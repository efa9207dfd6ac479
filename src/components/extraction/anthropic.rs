use super::media::ImageInput;
use super::models::Extraction;
use super::EventExtractor;
use crate::error::{extraction_error, AppResult};
use crate::utils::time::long_date;
use async_trait::async_trait;
use chrono::Local;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const MAX_TOKENS: u32 = 1024;

fn image_prompt(today: &str, context: &str) -> String {
    format!(
        "Extract event details from this image. Today is {today}.
{context}
Look for:
- Event title/name
- Date (convert relative dates like \"tomorrow\" or \"next Friday\" to actual dates)
- Time (start time, and end time if available)
- Location/venue
- Any additional relevant details

If the event spans multiple days (like Dec 6-7), return an ARRAY of events, one for each day.

Return ONLY JSON - either a single object OR an array:
Single: {{\"title\":\"Event Name\",\"date\":\"YYYY-MM-DD\",\"startTime\":\"HH:MM\",\"endTime\":\"HH:MM or null\",\"location\":\"Location or null\",\"description\":\"Details or null\",\"confidence\":\"high/medium/low\"}}
Multiple days: [{{\"title\":\"Event Name (Day 1)\",\"date\":\"2025-12-06\",\"startTime\":\"10:00\",\"endTime\":\"17:00\",\"location\":\"...\"}},{{\"title\":\"Event Name (Day 2)\",\"date\":\"2025-12-07\",\"startTime\":\"10:00\",\"endTime\":\"17:00\",\"location\":\"...\"}}]

If you cannot identify an event in the image, respond with:
{{\"error\":\"Could not identify event details\",\"rawText\":\"Any text you could extract from the image\"}}"
    )
}

fn text_prompt(today: &str, subject: &str, body: &str) -> String {
    format!(
        "Extract event details from this email. Today is {today}.

EMAIL SUBJECT: {subject}

EMAIL BODY:
{body}

Look for:
- Event title/name
- Date (convert relative dates to actual dates)
- Time (start time, and end time if available)
- Location/venue
- Any additional relevant details

Respond with ONLY valid JSON in this exact format:
{{\"title\":\"Event Title\",\"date\":\"YYYY-MM-DD\",\"startTime\":\"HH:MM\",\"endTime\":\"HH:MM or null if not specified\",\"location\":\"Location or null if not specified\",\"description\":\"Any additional details\"}}

If the event spans multiple days, return an ARRAY with one such object per day.

If you cannot identify an event, respond with:
{{\"error\":\"Could not identify event details\",\"reason\":\"Brief explanation\"}}"
    )
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Event extraction backed by the Anthropic Messages API
#[derive(Clone)]
pub struct AnthropicExtractor {
    client: Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl AnthropicExtractor {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            api_base: ANTHROPIC_API_BASE.to_string(),
        }
    }

    /// Point the client at another API root (tests)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    async fn complete(&self, content: Value) -> AppResult<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": content }],
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| extraction_error(&format!("Failed to reach the model: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!("Model request failed: {} {}", status, error_body);
            return Err(extraction_error(&format!(
                "Model request failed with status {}",
                status
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| extraction_error(&format!("Failed to parse model response: {}", e)))?;

        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| extraction_error("No text in model response"))
    }
}

#[async_trait]
impl EventExtractor for AnthropicExtractor {
    async fn extract_from_image(
        &self,
        image: &ImageInput,
        context: Option<&str>,
    ) -> AppResult<Extraction> {
        info!("Extracting event from {} image", image.media_type);

        let context_line = context
            .map(|c| format!("Email subject for context: {c}\n"))
            .unwrap_or_default();
        let prompt = image_prompt(&long_date(&Local::now()), &context_line);

        let content = json!([
            {
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.media_type,
                    "data": image.data,
                },
            },
            { "type": "text", "text": prompt },
        ]);

        let text = self.complete(content).await?;
        debug!("Model response: {}", text);
        Extraction::from_response_text(&text)
    }

    async fn extract_from_text(&self, text: &str, subject: Option<&str>) -> AppResult<Extraction> {
        info!("Extracting event from {} characters of text", text.len());

        let prompt = text_prompt(&long_date(&Local::now()), subject.unwrap_or(""), text);

        let content = json!([{ "type": "text", "text": prompt }]);

        let response = self.complete(content).await?;
        debug!("Model response: {}", response);
        Extraction::from_response_text(&response)
    }
}
