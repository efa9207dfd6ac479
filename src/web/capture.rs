use super::auth::{require_api_key, ApiError};
use super::{prefill_url, AppState};
use crate::components::extraction::{EventExtractor, Extraction, ImageInput};
use crate::models::EventPayload;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBody {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default, alias = "apiKey")]
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    token: Option<String>,
    key: Option<String>,
}

fn extractor(state: &AppState) -> Result<Arc<dyn EventExtractor>, ApiError> {
    state
        .extractor
        .clone()
        .ok_or(ApiError::NotConfigured("ANTHROPIC_API_KEY"))
}

fn image_from_body(body: &ImageBody) -> Result<ImageInput, ApiError> {
    let raw = body
        .image
        .as_deref()
        .filter(|image| !image.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No image provided".to_string()))?;

    ImageInput::from_base64(raw, body.media_type.as_deref())
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn extract_payloads(
    extractor: &dyn EventExtractor,
    image: &ImageInput,
) -> Result<Vec<EventPayload>, ApiError> {
    let extraction = extractor.extract_from_image(image, None).await?;
    extraction.into_payloads().map_err(|e| {
        warn!("Extraction produced no usable events: {}", e);
        ApiError::BadRequest(format!("Could not parse event details: {}", e))
    })
}

fn plain_text(body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

/// Return whatever the model extracted from a screenshot
pub async fn parse_screenshot_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KeyQuery>,
    Json(body): Json<ImageBody>,
) -> Result<Response, ApiError> {
    require_api_key(
        &headers,
        query.key.as_deref().or(body.key.as_deref()),
        &state.config.secret_key,
    )?;
    let extractor = extractor(&state)?;
    let image = image_from_body(&body)?;

    let response = match extractor.extract_from_image(&image, None).await? {
        Extraction::Single(event) => Json(json!(event)).into_response(),
        Extraction::MultiDay(events) => Json(json!(events)).into_response(),
        Extraction::NotFound { error, reason } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": error, "reason": reason })),
        )
            .into_response(),
    };

    Ok(response)
}

/// Extract from a screenshot and answer with a pre-filled confirmation form URL
/// as plain text, which is what iOS Shortcuts can open directly
pub async fn quick_add_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KeyQuery>,
    Json(body): Json<ImageBody>,
) -> Result<Response, ApiError> {
    require_api_key(
        &headers,
        query.key.as_deref().or(body.key.as_deref()),
        &state.config.secret_key,
    )?;
    let extractor = extractor(&state)?;
    let image = image_from_body(&body)?;

    let payloads = extract_payloads(extractor.as_ref(), &image).await?;
    info!("Quick add extracted {} event(s)", payloads.len());

    let url = prefill_url(&state.config.public_base_url, &payloads)?;
    Ok(plain_text(url))
}

/// Park an image and return a short id for the follow-up GET
pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KeyQuery>,
    Json(body): Json<ImageBody>,
) -> Result<Response, ApiError> {
    require_api_key(
        &headers,
        query.key.as_deref().or(body.key.as_deref()),
        &state.config.secret_key,
    )?;
    let image = image_from_body(&body)?;

    let id = state.uploads.put(image).await?;
    info!("Stored upload {}", id);
    Ok(plain_text(id))
}

/// Consume a parked image, extract it and send the browser to the form
pub async fn upload_redeem_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UploadQuery>,
) -> Result<Response, ApiError> {
    require_api_key(&headers, query.key.as_deref(), &state.config.secret_key)?;

    let id = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No token".to_string()))?;
    let image = state
        .uploads
        .take(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Token expired".to_string()))?;
    let extractor = extractor(&state)?;

    let target = match extract_payloads(extractor.as_ref(), &image).await {
        Ok(payloads) => prefill_url("", &payloads)?,
        Err(ApiError::BadRequest(_)) => "/confirm.html?error=parse".to_string(),
        Err(e) => {
            error!("Failed to process upload {}: {}", id, e);
            "/confirm.html?error=process".to_string()
        }
    };

    Ok(Redirect::to(&target).into_response())
}
