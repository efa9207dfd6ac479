use crate::error::{extraction_error, AppResult};
use crate::models::EventPayload;
use crate::utils::time::{parse_date, parse_time};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Event as the model reports it. Every field is optional and loosely typed;
/// the model sometimes writes `"null"` or leaves strings empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEvent {
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "loose_string", skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Why an extraction could not become calendar events
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("could not identify event details: {0}")]
    NotFound(String),
    #[error("no events were extracted")]
    Empty,
    #[error("event {index} is missing required field {field}")]
    MissingField { index: usize, field: &'static str },
    #[error("event {index} has an invalid {field}: {value}")]
    InvalidField {
        index: usize,
        field: &'static str,
        value: String,
    },
}

impl ExtractedEvent {
    /// Validate into a payload; `index` is used in error messages
    pub fn to_payload(&self, index: usize) -> Result<EventPayload, ExtractionError> {
        let title = self
            .title
            .clone()
            .ok_or(ExtractionError::MissingField { index, field: "title" })?;
        let date_raw = self
            .date
            .as_deref()
            .ok_or(ExtractionError::MissingField { index, field: "date" })?;
        let start_raw = self
            .start_time
            .as_deref()
            .ok_or(ExtractionError::MissingField { index, field: "startTime" })?;

        let date = parse_date(date_raw).ok_or_else(|| ExtractionError::InvalidField {
            index,
            field: "date",
            value: date_raw.to_string(),
        })?;
        let start_time = parse_time(start_raw).ok_or_else(|| ExtractionError::InvalidField {
            index,
            field: "startTime",
            value: start_raw.to_string(),
        })?;
        let end_time = match self.end_time.as_deref() {
            Some(raw) => Some(parse_time(raw).ok_or_else(|| ExtractionError::InvalidField {
                index,
                field: "endTime",
                value: raw.to_string(),
            })?),
            None => None,
        };

        Ok(EventPayload {
            title,
            date,
            start_time,
            end_time,
            location: self.location.clone(),
            description: self.description.clone(),
        })
    }

    fn is_not_found(&self) -> bool {
        self.error.is_some() && self.title.is_none()
    }
}

/// What the model returned, in whichever shape it chose
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Single(ExtractedEvent),
    MultiDay(Vec<ExtractedEvent>),
    NotFound {
        error: String,
        reason: Option<String>,
    },
}

impl Extraction {
    /// Interpret an already parsed JSON value
    pub fn from_value(value: Value) -> AppResult<Self> {
        match value {
            Value::Array(_) => {
                let events: Vec<ExtractedEvent> = serde_json::from_value(value)
                    .map_err(|e| extraction_error(&format!("Unexpected event list: {}", e)))?;
                Ok(Extraction::MultiDay(events))
            }
            Value::Object(_) => {
                let event: ExtractedEvent = serde_json::from_value(value)
                    .map_err(|e| extraction_error(&format!("Unexpected event object: {}", e)))?;
                if event.is_not_found() {
                    Ok(Extraction::NotFound {
                        error: event.error.unwrap_or_default(),
                        reason: event.reason.or(event.raw_text),
                    })
                } else {
                    Ok(Extraction::Single(event))
                }
            }
            _ => Err(extraction_error("Model response is not a JSON object or array")),
        }
    }

    /// Pull the JSON answer out of free-form model text
    pub fn from_response_text(text: &str) -> AppResult<Self> {
        let array = json_span(text, '[', ']');
        let object = json_span(text, '{', '}');

        // Whichever opens first is the outer structure
        let candidates = match (array, object) {
            (Some(a), Some(o)) if o.0 < a.0 => vec![o, a],
            (Some(a), Some(o)) => vec![a, o],
            (Some(a), None) => vec![a],
            (None, Some(o)) => vec![o],
            (None, None) => Vec::new(),
        };

        for (start, end) in candidates {
            if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Self::from_value(value);
            }
        }

        Err(extraction_error("No JSON found in model response"))
    }

    /// Normalize to payloads ready for the token codec
    pub fn into_payloads(self) -> Result<Vec<EventPayload>, ExtractionError> {
        let events = match self {
            Extraction::NotFound { error, reason } => {
                let detail = match reason {
                    Some(reason) => format!("{error} ({reason})"),
                    None => error,
                };
                return Err(ExtractionError::NotFound(detail));
            }
            Extraction::Single(event) => vec![event],
            Extraction::MultiDay(events) => events,
        };

        if events.is_empty() {
            return Err(ExtractionError::Empty);
        }

        events
            .iter()
            .enumerate()
            .map(|(index, event)| event.to_payload(index))
            .collect()
    }
}

fn json_span(text: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (start < end).then_some((start, end))
}
