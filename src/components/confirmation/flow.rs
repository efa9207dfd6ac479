use super::token::{TokenCodec, TokenError, INVALID_TOKEN_MESSAGE};
use crate::error::{AppResult, Error};
use crate::models::{CreatedEvent, EventPayload};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tracing::{error, info, warn};

/// Default time allowed for the calendar write during redemption
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(15);

/// Writes a confirmed event to a calendar
#[async_trait]
pub trait EventCreator: Send + Sync + 'static {
    async fn create_event(&self, payload: &EventPayload) -> AppResult<CreatedEvent>;
}

/// Sends a confirmation link to whoever submitted the event
#[async_trait]
pub trait LinkDelivery: Send + Sync + 'static {
    async fn deliver(&self, destination: &str, url: &str, payload: &EventPayload) -> AppResult<()>;
}

/// Why a redemption did not produce a calendar event
#[derive(Debug, ThisError)]
pub enum RedeemError {
    #[error("invalid confirmation token: {0}")]
    Invalid(#[from] TokenError),
    #[error("confirmed event is incomplete: {0}")]
    InvalidEvent(String),
    #[error("calendar write failed: {0}")]
    CreateFailed(Error),
    #[error("calendar write timed out")]
    TimedOut,
}

impl RedeemError {
    /// Message that is safe to show to the person holding the link
    pub fn user_message(&self) -> &'static str {
        match self {
            RedeemError::Invalid(_) => INVALID_TOKEN_MESSAGE,
            RedeemError::InvalidEvent(_) => {
                "This event is missing required details and could not be added to your calendar."
            }
            RedeemError::CreateFailed(Error::GoogleUnauthorized) => {
                "Could not create the event: the calendar authorization was rejected."
            }
            RedeemError::CreateFailed(_) => "Could not create the event. Please try again later.",
            RedeemError::TimedOut => {
                "The calendar took too long to respond. The link is still valid, please try again."
            }
        }
    }

    /// Whether trying the same link again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, RedeemError::CreateFailed(_) | RedeemError::TimedOut)
    }
}

/// A successful redemption
#[derive(Debug, Clone)]
pub struct RedeemedEvent {
    pub payload: EventPayload,
    pub created: CreatedEvent,
}

/// Issues confirmation links and redeems them into calendar events.
///
/// Redemption is not single-use: the same valid link opened twice creates two
/// calendar events. Adding dedup would need a store keyed by the token
/// signature.
#[derive(Clone)]
pub struct ConfirmationFlow {
    codec: TokenCodec,
    base_url: String,
    creator: Arc<dyn EventCreator>,
    delivery: Option<Arc<dyn LinkDelivery>>,
    create_timeout: Duration,
}

impl ConfirmationFlow {
    pub fn new(codec: TokenCodec, base_url: &str, creator: Arc<dyn EventCreator>) -> Self {
        Self {
            codec,
            base_url: base_url.trim_end_matches('/').to_string(),
            creator,
            delivery: None,
            create_timeout: DEFAULT_CREATE_TIMEOUT,
        }
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn LinkDelivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Mint a token for `payload` and return its confirmation URL
    pub fn issue(&self, payload: &EventPayload) -> Result<String, TokenError> {
        let token = self.codec.encode(payload)?;
        Ok(self.confirmation_url(&token))
    }

    /// Issue a link and hand it to the delivery channel without waiting for it
    pub fn issue_and_deliver(
        &self,
        payload: &EventPayload,
        destination: &str,
    ) -> Result<String, TokenError> {
        let url = self.issue(payload)?;

        match &self.delivery {
            Some(delivery) => {
                let delivery = Arc::clone(delivery);
                let destination = destination.to_string();
                let link = url.clone();
                let payload = payload.clone();
                tokio::spawn(async move {
                    match delivery.deliver(&destination, &link, &payload).await {
                        Ok(()) => info!("Sent confirmation link for \"{}\" to {}", payload.title, destination),
                        Err(e) => error!("Failed to deliver confirmation link to {}: {}", destination, e),
                    }
                });
            }
            None => warn!("No delivery channel configured, confirmation link not sent"),
        }

        Ok(url)
    }

    /// Validate `token` and write the event it carries to the calendar
    pub async fn redeem(&self, token: &str) -> Result<RedeemedEvent, RedeemError> {
        let payload = self.codec.decode(token).map_err(|e| {
            warn!(kind = e.kind(), "Rejected confirmation token");
            RedeemError::Invalid(e)
        })?;

        if payload.title.trim().is_empty() {
            return Err(RedeemError::InvalidEvent("title is empty".to_string()));
        }

        let created = tokio::time::timeout(self.create_timeout, self.creator.create_event(&payload))
            .await
            .map_err(|_| {
                warn!("Calendar write for \"{}\" timed out", payload.title);
                RedeemError::TimedOut
            })?
            .map_err(|e| {
                error!("Failed to create \"{}\": {}", payload.title, e);
                RedeemError::CreateFailed(e)
            })?;

        info!("Created calendar event {} for \"{}\"", created.id, payload.title);
        Ok(RedeemedEvent { payload, created })
    }

    fn confirmation_url(&self, token: &str) -> String {
        format!(
            "{}/confirm?token={}",
            self.base_url,
            urlencoding::encode(token)
        )
    }
}
