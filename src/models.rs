use crate::utils::time::format_time;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// An event waiting to be written to the calendar.
///
/// This is what a confirmation token carries. It has no identity beyond its
/// contents and is never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub title: String,
    pub date: NaiveDate,
    #[serde(with = "crate::utils::time::hhmm")]
    pub start_time: NaiveTime,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::utils::time::hhmm_option"
    )]
    pub end_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EventPayload {
    /// Create a payload with only the required fields
    pub fn new(title: impl Into<String>, date: NaiveDate, start_time: NaiveTime) -> Self {
        Self {
            title: title.into(),
            date,
            start_time,
            end_time: None,
            location: None,
            description: None,
        }
    }

    pub fn with_end_time(mut self, end_time: NaiveTime) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Time span for display, e.g. "09:00 - 10:30" or just "09:00"
    pub fn time_range(&self) -> String {
        match &self.end_time {
            Some(end) => format!("{} - {}", format_time(&self.start_time), format_time(end)),
            None => format_time(&self.start_time),
        }
    }

    /// Short plain-text summary lines for emails and result pages
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Date: {}", self.date.format("%Y-%m-%d")),
            format!("Time: {}", self.time_range()),
        ];
        if let Some(location) = &self.location {
            lines.push(format!("Location: {location}"));
        }
        lines
    }
}

/// An event as created by the calendar collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub id: String,
    #[serde(default)]
    pub html_link: Option<String>,
}
