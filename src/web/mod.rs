//! HTTP surface: capture endpoints, confirmation links and the Google OAuth
//! round trip.

pub mod auth;
mod capture;
mod confirm;
mod google;
mod inbound;
pub mod pages;

use crate::components::confirmation::ConfirmationFlow;
use crate::components::extraction::EventExtractor;
use crate::components::google_calendar::{GoogleAuth, GoogleCalendarClient};
use crate::components::inbound_email::SenderPolicy;
use crate::components::upload_store::UploadStore;
use crate::config::Config;
use crate::error::{config_error, AppResult};
use crate::models::EventPayload;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use url::form_urlencoded;

/// 10MB, screenshots arrive base64 encoded in JSON
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub flow: ConfirmationFlow,
    pub uploads: Arc<dyn UploadStore>,
    pub extractor: Option<Arc<dyn EventExtractor>>,
    pub google_auth: Option<GoogleAuth>,
    pub calendar_client: GoogleCalendarClient,
    pub senders: SenderPolicy,
}

impl AppState {
    pub fn new(config: Config, flow: ConfirmationFlow, uploads: Arc<dyn UploadStore>) -> Self {
        let senders = SenderPolicy::new(&config.allowed_email_senders);
        Self {
            config: Arc::new(config),
            flow,
            uploads,
            extractor: None,
            google_auth: None,
            calendar_client: GoogleCalendarClient::new(),
            senders,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn EventExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_google_auth(mut self, auth: GoogleAuth) -> Self {
        self.google_auth = Some(auth);
        self
    }

    pub fn with_calendar_client(mut self, client: GoogleCalendarClient) -> Self {
        self.calendar_client = client;
        self
    }
}

/// Build the application router
pub fn router(state: AppState) -> AppResult<Router> {
    let cors = cors_layer(state.config.allowed_origin.as_deref())?;

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/confirm", get(confirm::confirm_handler))
        .route("/api/confirm-event", get(confirm::confirm_handler))
        .route("/api/parse-screenshot", post(capture::parse_screenshot_handler))
        .route("/api/quick-add", post(capture::quick_add_handler))
        .route(
            "/api/upload",
            get(capture::upload_redeem_handler).post(capture::upload_handler),
        )
        .route("/api/calendars", get(google::calendars_handler))
        .route(
            "/api/create-event",
            get(google::create_event_page_handler).post(google::create_event_handler),
        )
        .route("/api/auth/google", get(google::auth_redirect_handler))
        .route("/api/auth/callback", get(google::auth_callback_handler))
        .route("/api/inbound-email", post(inbound::inbound_email_handler))
        .fallback_service(ServeDir::new("public"))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    Ok(app)
}

fn cors_layer(allowed_origin: Option<&str>) -> AppResult<CorsLayer> {
    let Some(origin) = allowed_origin else {
        return Ok(CorsLayer::permissive());
    };

    let origin = HeaderValue::from_str(origin)
        .map_err(|_| config_error(&format!("Invalid ALLOWED_ORIGIN: {}", origin)))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(auth::API_KEY_HEADER),
            HeaderName::from_static(auth::WEBHOOK_SECRET_HEADER),
        ]))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

/// Link to the confirmation form, pre-filled with extracted events
pub fn prefill_url(base_url: &str, payloads: &[EventPayload]) -> AppResult<String> {
    let events = serde_json::to_string(payloads)?;
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("events", &events)
        .append_pair("prefilled", "1")
        .finish();
    Ok(format!("{}/confirm.html?{}", base_url, query))
}
