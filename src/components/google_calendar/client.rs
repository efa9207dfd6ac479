use super::models::{CalendarEventRequest, CalendarListResponse, CalendarSummary};
use crate::error::{google_calendar_error, AppResult, Error};
use crate::models::CreatedEvent;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::error;

pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: Option<String>,
}

/// Thin client for the Calendar REST API
#[derive(Clone)]
pub struct GoogleCalendarClient {
    client: Client,
    api_base: String,
    userinfo_url: String,
}

impl Default for GoogleCalendarClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleCalendarClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            api_base: CALENDAR_API_BASE.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
        }
    }

    /// Point the client at another API root (tests)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.userinfo_url = format!("{}/oauth2/v2/userinfo", self.api_base);
        self
    }

    /// Insert an event into `calendar_id`
    pub async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &CalendarEventRequest,
    ) -> AppResult<CreatedEvent> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to create event: {}", e)))?;

        let response = check_status(response, "create event").await?;

        response
            .json::<CreatedEvent>()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to parse created event: {}", e)))
    }

    /// Calendars the user owns or can write to, primary first then by name
    pub async fn list_calendars(&self, access_token: &str) -> AppResult<Vec<CalendarSummary>> {
        let url = format!("{}/users/me/calendarList", self.api_base);

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to fetch calendars: {}", e)))?;

        let response = check_status(response, "fetch calendars").await?;

        let list: CalendarListResponse = response
            .json()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to parse calendar list: {}", e)))?;

        let mut calendars: Vec<CalendarSummary> = list
            .items
            .into_iter()
            .filter(|cal| cal.access_role == "owner" || cal.access_role == "writer")
            .map(|cal| CalendarSummary {
                id: cal.id,
                name: cal.summary,
                primary: cal.primary,
                background_color: cal.background_color,
            })
            .collect();

        calendars.sort_by(|a, b| b.primary.cmp(&a.primary).then_with(|| a.name.cmp(&b.name)));

        Ok(calendars)
    }

    /// Email address of the account behind `access_token`
    pub async fn user_email(&self, access_token: &str) -> AppResult<Option<String>> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to fetch user info: {}", e)))?;

        let response = check_status(response, "fetch user info").await?;
        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to parse user info: {}", e)))?;

        Ok(info.email)
    }
}

async fn check_status(response: Response, action: &str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "Could not read error response".to_string());
    error!("Calendar API error while trying to {}: {} {}", action, status, error_body);

    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::GoogleUnauthorized);
    }

    let message = serde_json::from_str::<serde_json::Value>(&error_body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or(error_body);

    Err(google_calendar_error(&format!(
        "Failed to {}: HTTP {} - {}",
        action, status, message
    )))
}
