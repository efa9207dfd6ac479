pub mod auth;
pub mod client;
pub mod models;
pub mod time;

pub use auth::GoogleAuth;
pub use client::GoogleCalendarClient;
pub use models::{CalendarEventRequest, CalendarSummary};

use crate::components::confirmation::EventCreator;
use crate::error::{google_calendar_error, AppResult};
use crate::models::{CreatedEvent, EventPayload};
use async_trait::async_trait;
use tracing::info;

/// Writes confirmed events to the server's own calendar using the configured
/// refresh token.
#[derive(Clone)]
pub struct GoogleCalendar {
    auth: GoogleAuth,
    client: GoogleCalendarClient,
    calendar_id: String,
    timezone: String,
}

impl GoogleCalendar {
    pub fn new(
        auth: GoogleAuth,
        client: GoogleCalendarClient,
        calendar_id: &str,
        timezone: &str,
    ) -> Self {
        Self {
            auth,
            client,
            calendar_id: calendar_id.to_string(),
            timezone: timezone.to_string(),
        }
    }
}

#[async_trait]
impl EventCreator for GoogleCalendar {
    async fn create_event(&self, payload: &EventPayload) -> AppResult<CreatedEvent> {
        let access_token = self.auth.access_token().await?;
        let request = time::build_event_request(payload, &self.timezone)?;

        info!("Creating \"{}\" in calendar {}", payload.title, self.calendar_id);
        self.client
            .create_event(&access_token, &self.calendar_id, &request)
            .await
    }
}

/// Used when no refresh token is configured; every confirmation fails with a
/// clear error instead of the server refusing to start
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarNotConfigured;

#[async_trait]
impl EventCreator for CalendarNotConfigured {
    async fn create_event(&self, _payload: &EventPayload) -> AppResult<CreatedEvent> {
        Err(google_calendar_error(
            "Google Calendar is not configured, set GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_REFRESH_TOKEN",
        ))
    }
}
