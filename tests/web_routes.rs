use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{NaiveDate, NaiveTime};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use snapcal::components::confirmation::{
    ConfirmationFlow, EventCreator, TokenCodec, INVALID_TOKEN_MESSAGE,
};
use snapcal::components::extraction::{EventExtractor, ExtractedEvent, Extraction, ImageInput};
use snapcal::components::google_calendar::GoogleCalendarClient;
use snapcal::components::upload_store::InMemoryUploadStore;
use snapcal::config::Config;
use snapcal::error::AppResult;
use snapcal::models::{CreatedEvent, EventPayload};
use snapcal::web::{self, AppState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "s3cr3t";
const WEBHOOK_SECRET: &str = "hook-secret";
const PNG_PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

#[derive(Default)]
struct CountingCalendar {
    calls: AtomicUsize,
}

#[async_trait]
impl EventCreator for CountingCalendar {
    async fn create_event(&self, _payload: &EventPayload) -> AppResult<CreatedEvent> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedEvent {
            id: format!("evt-{call}"),
            html_link: Some(format!("https://calendar.example/evt-{call}")),
        })
    }
}

/// Extractor that always answers with the same result
struct FixedExtractor(Extraction);

#[async_trait]
impl EventExtractor for FixedExtractor {
    async fn extract_from_image(
        &self,
        _image: &ImageInput,
        _context: Option<&str>,
    ) -> AppResult<Extraction> {
        Ok(self.0.clone())
    }

    async fn extract_from_text(&self, _text: &str, _subject: Option<&str>) -> AppResult<Extraction> {
        Ok(self.0.clone())
    }
}

fn dentist() -> EventPayload {
    EventPayload::new(
        "Dentist",
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    )
}

fn dentist_extraction() -> Extraction {
    Extraction::Single(ExtractedEvent {
        title: Some("Dentist".to_string()),
        date: Some("2025-03-01".to_string()),
        start_time: Some("09:00".to_string()),
        ..Default::default()
    })
}

fn config() -> Config {
    Config::from_lookup(|name| match name {
        "APP_SECRET_KEY" => Some(API_KEY.to_string()),
        "PUBLIC_BASE_URL" => Some("https://snap.example".to_string()),
        "ALLOWED_EMAIL_SENDERS" => Some("me@example.com".to_string()),
        "CLOUDFLARE_WEBHOOK_SECRET" => Some(WEBHOOK_SECRET.to_string()),
        _ => None,
    })
    .unwrap()
}

fn state_with(calendar: Arc<CountingCalendar>, extraction: Option<Extraction>) -> AppState {
    let config = config();
    let codec = TokenCodec::new(&config.secret_key).unwrap();
    let flow = ConfirmationFlow::new(codec, &config.public_base_url, calendar);
    let mut state = AppState::new(config, flow, Arc::new(InMemoryUploadStore::new()));
    if let Some(extraction) = extraction {
        state = state.with_extractor(Arc::new(FixedExtractor(extraction)));
    }
    state
}

fn app(extraction: Option<Extraction>) -> Router {
    web::router(state_with(Arc::default(), extraction)).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(None), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_confirm_without_token() {
    let (status, body) = send(&app(None), get("/confirm")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("No confirmation token provided."));
}

#[tokio::test]
async fn test_confirm_rejects_bad_tokens_with_one_message() {
    let app = app(None);
    let foreign = TokenCodec::new("wrong-secret").unwrap().encode(&dentist()).unwrap();

    for uri in [
        "/confirm?token=garbage".to_string(),
        format!("/confirm?token={}", urlencoding::encode(&foreign)),
        "/api/confirm-event?token=a.b".to_string(),
    ] {
        let (status, body) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body.contains(INVALID_TOKEN_MESSAGE), "{uri}");
        assert!(!body.contains("signature"), "{uri}");
    }
}

#[tokio::test]
async fn test_confirm_creates_event_each_time() {
    let calendar = Arc::new(CountingCalendar::default());
    let state = state_with(calendar.clone(), None);
    let url = state.flow.issue(&dentist()).unwrap();
    let app = web::router(state).unwrap();

    let uri = url.trim_start_matches("https://snap.example");
    let (status, body) = send(&app, get(uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Event Created!"));
    assert!(body.contains("Dentist"));
    assert!(body.contains("View in Calendar"));

    let (status, _) = send(&app, get(uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(calendar.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_capture_endpoints_require_api_key() {
    let app = app(Some(dentist_extraction()));

    for uri in ["/api/quick-add", "/api/upload", "/api/parse-screenshot"] {
        let (status, _) = send(&app, post_json(uri, json!({ "image": PNG_PIXEL }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");

        let (status, _) = send(
            &app,
            post_json(&format!("{uri}?key=nope"), json!({ "image": PNG_PIXEL })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
    }

    let (status, _) = send(&app, get("/api/upload?token=abc")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_quick_add_returns_prefill_url() {
    let app = app(Some(dentist_extraction()));
    let request = post_json(
        &format!("/api/quick-add?key={API_KEY}"),
        json!({ "image": format!("data:image/png;base64,{PNG_PIXEL}") }),
    );

    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("https://snap.example/confirm.html?events="));
    assert!(body.ends_with("&prefilled=1"));
    assert!(!body.contains(API_KEY));
}

#[tokio::test]
async fn test_quick_add_without_image() {
    let app = app(Some(dentist_extraction()));
    let (status, body) = send(&app, post_json("/api/quick-add", json!({ "apiKey": API_KEY }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("No image provided"));
}

#[tokio::test]
async fn test_parse_screenshot_reports_missing_event() {
    let app = app(Some(Extraction::NotFound {
        error: "Could not identify event details".to_string(),
        reason: None,
    }));
    let request = Request::builder()
        .method("POST")
        .uri("/api/parse-screenshot")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(json!({ "image": PNG_PIXEL }).to_string()))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.contains("Could not identify event details"));
}

#[tokio::test]
async fn test_extraction_endpoints_without_extractor() {
    let app = app(None);
    let request = post_json(
        &format!("/api/quick-add?key={API_KEY}"),
        json!({ "image": PNG_PIXEL }),
    );
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_upload_round_trip() {
    let app = app(Some(dentist_extraction()));

    let (status, id) = send(
        &app,
        post_json(
            &format!("/api/upload?key={API_KEY}"),
            json!({ "image": PNG_PIXEL }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(id.len(), 16);

    let redeem = format!("/api/upload?token={id}&key={API_KEY}");
    let response = app.clone().oneshot(get(&redeem)).await.unwrap();
    assert!(response.status().is_redirection());
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("/confirm.html?events="));

    // Uploads are consumed by the first read
    let (status, body) = send(&app, get(&redeem)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Token expired"));
}

#[tokio::test]
async fn test_upload_with_unreadable_event_redirects_to_error() {
    let app = app(Some(Extraction::NotFound {
        error: "Could not identify event details".to_string(),
        reason: None,
    }));

    let (_, id) = send(
        &app,
        post_json(
            &format!("/api/upload?key={API_KEY}"),
            json!({ "image": PNG_PIXEL }),
        ),
    )
    .await;

    let response = app
        .clone()
        .oneshot(get(&format!("/api/upload?token={id}&key={API_KEY}")))
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::LOCATION],
        "/confirm.html?error=parse"
    );
}

fn inbound(secret: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/inbound-email")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(secret) = secret {
        builder = builder.header("x-webhook-secret", secret);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

const RAW_EMAIL: &str = "From: Me <me@example.com>\r\n\
To: events@snap.example\r\n\
Subject: Dentist\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Dentist appointment on March 1st at 9am.\r\n";

#[tokio::test]
async fn test_inbound_email_checks_secret_first() {
    let app = app(Some(dentist_extraction()));
    let body = json!({ "from": "stranger@evil.example", "rawEmail": "" });

    let (status, _) = send(&app, inbound(None, body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, inbound(Some("wrong"), body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_inbound_email_rejects_empty_and_unknown_senders() {
    let app = app(Some(dentist_extraction()));

    let (status, _) = send(
        &app,
        inbound(Some(WEBHOOK_SECRET), json!({ "from": "me@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        inbound(
            Some(WEBHOOK_SECRET),
            json!({ "from": "stranger@evil.example", "rawEmail": RAW_EMAIL }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("Sender not in whitelist"));
}

#[tokio::test]
async fn test_inbound_email_issues_confirmation() {
    let calendar = Arc::new(CountingCalendar::default());
    let app = web::router(state_with(calendar.clone(), Some(dentist_extraction()))).unwrap();

    let (status, body) = send(
        &app,
        inbound(
            Some(WEBHOOK_SECRET),
            json!({
                "from": "Me <ME@example.com>",
                "subject": "Dentist",
                "rawEmail": RAW_EMAIL,
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["count"], 1);
    // Nothing is written until the link is opened
    assert_eq!(calendar.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_calendars_require_bearer_token() {
    let (status, _) = send(&app(None), get("/api/calendars")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_user_token_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let state = state_with(Arc::default(), None)
        .with_calendar_client(GoogleCalendarClient::new().with_api_base(&server.uri()));
    let app = web::router(state).unwrap();

    let request = Request::builder()
        .uri("/api/calendars")
        .header(header::AUTHORIZATION, "Bearer stale")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "token_expired");
}

#[tokio::test]
async fn test_google_sign_in_without_credentials() {
    let (status, _) = send(&app(None), get("/api/auth/google")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_create_event_rejects_out_of_range_dates() {
    let app = app(None);

    let (status, _) = send(
        &app,
        get("/api/create-event?accessToken=anything&title=a&date=%2B262142-12-31&startTime=23:30"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json(
            "/api/create-event",
            json!({
                "accessToken": "anything",
                "title": "a",
                "date": "+262142-12-31",
                "startTime": "23:30",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
