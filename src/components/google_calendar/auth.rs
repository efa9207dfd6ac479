use super::models::OAuthTokens;
use crate::error::{google_calendar_error, AppResult};
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes needed to list calendars and insert events
pub const CALENDAR_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events",
];

/// Scope needed to send confirmation emails
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Refresh this many seconds before Google says the token expires
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

/// Google OAuth client: consent URLs, code exchange and access tokens for
/// the server's own refresh token.
#[derive(Clone)]
pub struct GoogleAuth {
    client_id: String,
    client_secret: String,
    refresh_token: Option<String>,
    token_url: String,
    client: Client,
    cache: Arc<RwLock<Option<CachedToken>>>,
}

impl GoogleAuth {
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: None,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            client: Client::new(),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Use a long-lived refresh token for server-side calendar writes
    pub fn with_refresh_token(mut self, refresh_token: &str) -> Self {
        self.refresh_token = Some(refresh_token.to_string());
        self
    }

    /// Point token requests somewhere else (tests)
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Build the consent screen URL
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        scopes: &[&str],
        state: &str,
    ) -> AppResult<String> {
        let scope = scopes.join(" ");
        let url = Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| google_calendar_error(&format!("Failed to build authorization URL: {}", e)))?;

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> AppResult<OAuthTokens> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        self.request_tokens(&params, "exchange authorization code").await
    }

    /// Access token for the configured refresh token, refreshed when stale
    pub async fn access_token(&self) -> AppResult<String> {
        let now = Utc::now().timestamp();

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at - EXPIRY_MARGIN_SECS > now {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let refresh_token = self
            .refresh_token
            .as_deref()
            .ok_or_else(|| google_calendar_error("GOOGLE_REFRESH_TOKEN is not configured"))?;

        let tokens = self.refresh(refresh_token).await?;
        let access_token = tokens.access_token.clone();

        *self.cache.write().await = Some(CachedToken {
            access_token: tokens.access_token,
            expires_at: now + tokens.expires_in,
        });
        info!("Refreshed Google access token");

        Ok(access_token)
    }

    /// Trade a refresh token for a fresh access token
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<OAuthTokens> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        self.request_tokens(&params, "refresh token").await
    }

    async fn request_tokens(&self, params: &[(&str, &str)], action: &str) -> AppResult<OAuthTokens> {
        debug!("Requesting Google tokens to {}", action);

        let response = self
            .client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to {}: {}", action, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(google_calendar_error(&format!(
                "Failed to {}: HTTP {} - {}",
                action, status, error_body
            )));
        }

        response
            .json::<OAuthTokens>()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to parse token response: {}", e)))
    }
}
