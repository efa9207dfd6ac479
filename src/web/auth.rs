use crate::error::Error;
use crate::utils::secrets_match;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error as ThisError;
use tracing::{error, warn};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Errors returned by the JSON endpoints
#[derive(Debug, ThisError)]
pub enum ApiError {
    #[error("Unauthorized - invalid API key")]
    InvalidApiKey,
    #[error("Missing or invalid authorization header")]
    MissingAccessToken,
    #[error("Access token expired")]
    TokenExpired,
    #[error("Unauthorized")]
    InvalidWebhookSecret,
    #[error("Sender not in whitelist")]
    SenderNotAllowed,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error(transparent)]
    Internal(#[from] Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::InvalidApiKey
            | ApiError::MissingAccessToken
            | ApiError::InvalidWebhookSecret => {
                (StatusCode::UNAUTHORIZED, json!({ "error": self.to_string() }))
            }
            ApiError::TokenExpired | ApiError::Internal(Error::GoogleUnauthorized) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "token_expired", "message": "Access token expired" }),
            ),
            ApiError::SenderNotAllowed => {
                (StatusCode::FORBIDDEN, json!({ "error": self.to_string() }))
            }
            ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, json!({ "error": self.to_string() }))
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": self.to_string() })),
            ApiError::NotConfigured(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": self.to_string() }),
            ),
            ApiError::Internal(e) => {
                error!("Request failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Request failed", "details": e.to_string() }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Accept the key from the `X-API-Key` header, falling back to a query or
/// body field
pub fn require_api_key(
    headers: &HeaderMap,
    fallback: Option<&str>,
    expected: &str,
) -> Result<(), ApiError> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(fallback);

    match provided {
        Some(key) if secrets_match(key, expected) => Ok(()),
        _ => {
            warn!("Rejected request with missing or invalid API key");
            Err(ApiError::InvalidApiKey)
        }
    }
}

/// Token from an `Authorization: Bearer ...` header
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub fn webhook_secret(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
}

/// Keep post-login redirects on this site
pub fn safe_return_path(return_to: Option<&str>) -> String {
    match return_to {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/confirm.html".to_string(),
    }
}
