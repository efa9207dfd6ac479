use super::auth::{bearer_token, safe_return_path, ApiError};
use super::pages::ResultPage;
use super::AppState;
use crate::components::extraction::ExtractedEvent;
use crate::components::google_calendar::auth::CALENDAR_SCOPES;
use crate::components::google_calendar::time::build_event_request;
use crate::components::google_calendar::GoogleAuth;
use crate::error::Error;
use crate::models::{CreatedEvent, EventPayload};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use url::form_urlencoded;

/// Fields of a direct create request, from a query string or JSON body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventParams {
    title: Option<String>,
    date: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
    location: Option<String>,
    description: Option<String>,
    calendar_id: Option<String>,
    access_token: Option<String>,
}

impl CreateEventParams {
    fn payload(&self) -> Option<EventPayload> {
        let blank_to_none = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        let event = ExtractedEvent {
            title: blank_to_none(&self.title),
            date: blank_to_none(&self.date),
            start_time: blank_to_none(&self.start_time),
            end_time: blank_to_none(&self.end_time),
            location: blank_to_none(&self.location),
            description: blank_to_none(&self.description),
            ..Default::default()
        };
        event
            .to_payload(0)
            .map_err(|e| warn!("Rejected create request: {}", e))
            .ok()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthQuery {
    return_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn google_auth(state: &AppState) -> Result<&GoogleAuth, ApiError> {
    state
        .google_auth
        .as_ref()
        .ok_or(ApiError::NotConfigured("Google OAuth"))
}

fn callback_url(state: &AppState) -> String {
    format!("{}/api/auth/callback", state.config.public_base_url)
}

async fn create_with_user_token(
    state: &AppState,
    access_token: &str,
    params: &CreateEventParams,
    payload: &EventPayload,
) -> Result<CreatedEvent, Error> {
    let calendar_id = params
        .calendar_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or(&state.config.google_calendar_id);
    let request = build_event_request(payload, &state.config.timezone)?;

    state
        .calendar_client
        .create_event(access_token, calendar_id, &request)
        .await
}

/// Writable calendars of the signed-in user
pub async fn calendars_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let access_token = bearer_token(&headers).ok_or(ApiError::MissingAccessToken)?;
    let calendars = state.calendar_client.list_calendars(&access_token).await?;
    Ok(Json(json!({ "calendars": calendars })))
}

/// Create an event with the user's own token and answer with JSON
pub async fn create_event_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<CreateEventParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let access_token = bearer_token(&headers)
        .or_else(|| params.access_token.clone())
        .ok_or(ApiError::MissingAccessToken)?;
    let payload = params
        .payload()
        .ok_or_else(|| ApiError::BadRequest("Missing required fields".to_string()))?;

    let created = create_with_user_token(&state, &access_token, &params, &payload).await?;
    info!("Created \"{}\" with a user token", payload.title);

    Ok(Json(json!({
        "success": true,
        "eventId": created.id,
        "htmlLink": created.html_link,
        "message": format!("Event \"{}\" created successfully", payload.title),
    })))
}

/// Same as [`create_event_handler`] but for links opened in a web view
pub async fn create_event_page_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CreateEventParams>,
) -> Response {
    let Some(access_token) = bearer_token(&headers).or_else(|| params.access_token.clone()) else {
        return ResultPage::failure("Error", "Not signed in. Please sign in with Google first.")
            .into_response_with(StatusCode::UNAUTHORIZED);
    };
    let Some(payload) = params.payload() else {
        return ResultPage::failure("Error", "Missing required fields: title, date, and start time")
            .into_response_with(StatusCode::BAD_REQUEST);
    };

    match create_with_user_token(&state, &access_token, &params, &payload).await {
        Ok(created) => ResultPage::success(
            "Event Created",
            format!("Event \"{}\" created!", payload.title),
        )
        .with_details(payload.summary_lines())
        .with_calendar_link(created.html_link)
        .into_response_with(StatusCode::OK),
        Err(Error::GoogleUnauthorized) => {
            ResultPage::failure("Error", "Session expired. Please sign in again.")
                .into_response_with(StatusCode::UNAUTHORIZED)
        }
        Err(e) => {
            error!("Failed to create event: {}", e);
            ResultPage::failure("Error", "Failed to create event. Please try again.")
                .into_response_with(StatusCode::BAD_GATEWAY)
        }
    }
}

/// Send the browser to Google's consent screen
pub async fn auth_redirect_handler(
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
) -> Result<Redirect, ApiError> {
    let auth = google_auth(&state)?;
    let return_to = safe_return_path(query.return_to.as_deref());
    let url = auth.authorization_url(&callback_url(&state), &CALENDAR_SCOPES, &return_to)?;
    Ok(Redirect::to(&url))
}

/// Finish the OAuth round trip. Tokens go back in the URL fragment so they
/// never reach a server log.
pub async fn auth_callback_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ApiError> {
    let auth_error = |reason: &str| {
        Redirect::to(&format!(
            "/confirm.html?auth_error={}",
            urlencoding::encode(reason)
        ))
    };

    if let Some(reason) = query.error.as_deref() {
        warn!("Google OAuth returned an error: {}", reason);
        return Ok(auth_error(reason));
    }
    let Some(code) = query.code.as_deref() else {
        return Ok(auth_error("no_code"));
    };
    let auth = google_auth(&state)?;

    let tokens = match auth.exchange_code(code, &callback_url(&state)).await {
        Ok(tokens) => tokens,
        Err(e) => {
            error!("OAuth code exchange failed: {}", e);
            return Ok(auth_error("token_exchange_failed"));
        }
    };

    let user_email = match state.calendar_client.user_email(&tokens.access_token).await {
        Ok(email) => email.unwrap_or_default(),
        Err(e) => {
            warn!("Failed to get user info: {}", e);
            String::new()
        }
    };

    let fragment = form_urlencoded::Serializer::new(String::new())
        .append_pair("access_token", &tokens.access_token)
        .append_pair("refresh_token", tokens.refresh_token.as_deref().unwrap_or(""))
        .append_pair("expires_in", &tokens.expires_in.to_string())
        .append_pair("user_email", &user_email)
        .finish();
    let return_to = safe_return_path(query.state.as_deref());

    Ok(Redirect::to(&format!("{}#{}", return_to, fragment)))
}
