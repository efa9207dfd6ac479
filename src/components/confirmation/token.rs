//! Signed, self-expiring confirmation tokens.
//!
//! A token is `<base64 body>.<hex hmac>` where the body is the JSON object
//! `{"event": <EventPayload>, "exp": <unix millis>}` and the MAC is
//! HMAC-SHA-256 over the base64 text. Nothing is stored server side: any
//! process holding the same secret can verify a token minted by another.

use crate::models::EventPayload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Default validity window for a confirmation token
pub const DEFAULT_VALIDITY_HOURS: i64 = 24;

/// Message shown to anyone presenting a token that failed validation
pub const INVALID_TOKEN_MESSAGE: &str =
    "This confirmation link is invalid or has expired.";

/// Why a token was rejected.
///
/// The variants are for logs and internal callers only. Anything facing an
/// unauthenticated requester must render all of them the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed confirmation token")]
    MalformedToken,
    #[error("confirmation token signature mismatch")]
    SignatureMismatch,
    #[error("confirmation token expired")]
    Expired,
    #[error("confirmation token secret is not configured")]
    MissingSecret,
    #[error("confirmation token expiry is out of range")]
    ExpiryOutOfRange,
    #[error("failed to serialize confirmation token: {0}")]
    Serialization(String),
}

impl TokenError {
    /// Short label for structured logging
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::MalformedToken => "malformed",
            TokenError::SignatureMismatch => "signature_mismatch",
            TokenError::Expired => "expired",
            TokenError::MissingSecret => "missing_secret",
            TokenError::ExpiryOutOfRange => "expiry_out_of_range",
            TokenError::Serialization(_) => "serialization",
        }
    }
}

#[derive(Serialize)]
struct TokenBodyRef<'a> {
    event: &'a EventPayload,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenBody {
    event: EventPayload,
    exp: i64,
}

/// Encoder/decoder bound to one secret and validity window
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
    validity: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec with the default 24 hour validity window
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        let mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::MissingSecret)?;
        Ok(Self {
            mac,
            validity: Duration::hours(DEFAULT_VALIDITY_HOURS),
        })
    }

    /// Override the validity window
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Mint a token that expires `validity` from now
    pub fn encode(&self, payload: &EventPayload) -> Result<String, TokenError> {
        self.encode_at(payload, Utc::now())
    }

    /// Mint a token as if the current time were `now`
    pub fn encode_at(
        &self,
        payload: &EventPayload,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let exp = now
            .checked_add_signed(self.validity)
            .ok_or(TokenError::ExpiryOutOfRange)?;
        let body = TokenBodyRef {
            event: payload,
            exp: exp.timestamp_millis(),
        };
        let json =
            serde_json::to_vec(&body).map_err(|e| TokenError::Serialization(e.to_string()))?;
        let encoded_body = STANDARD.encode(json);
        let signature = self.sign(&encoded_body);

        Ok(format!("{encoded_body}.{signature}"))
    }

    /// Verify a token and return the event it carries
    pub fn decode(&self, token: &str) -> Result<EventPayload, TokenError> {
        self.decode_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<EventPayload, TokenError> {
        let mut parts = token.split('.');
        let (body, signature) = match (parts.next(), parts.next(), parts.next()) {
            (Some(body), Some(signature), None) => (body, signature),
            _ => return Err(TokenError::MalformedToken),
        };

        let expected = self.sign(body);
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(TokenError::SignatureMismatch);
        }

        let raw = STANDARD.decode(body).map_err(|e| {
            debug!("Token body is not valid base64: {}", e);
            TokenError::MalformedToken
        })?;
        let parsed: TokenBody = serde_json::from_slice(&raw).map_err(|e| {
            debug!("Token body is not a valid event payload: {}", e);
            TokenError::MalformedToken
        })?;

        if now.timestamp_millis() >= parsed.exp {
            return Err(TokenError::Expired);
        }

        Ok(parsed.event)
    }

    fn sign(&self, encoded_body: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(encoded_body.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Mint a token for `payload` signed with `secret`
pub fn encode(
    payload: &EventPayload,
    secret: &str,
    validity: Duration,
) -> Result<String, TokenError> {
    TokenCodec::new(secret)?.with_validity(validity).encode(payload)
}

/// Verify `token` against `secret` and return its payload
pub fn decode(token: &str, secret: &str) -> Result<EventPayload, TokenError> {
    TokenCodec::new(secret)?.decode(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    fn dentist() -> EventPayload {
        EventPayload::new(
            "Dentist",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        )
    }

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 20, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_token_shape() {
        let codec = TokenCodec::new("s3cr3t").unwrap();
        let token = codec.encode_at(&dentist(), issued_at()).unwrap();

        let (body, signature) = token.split_once('.').unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));

        let json: serde_json::Value =
            serde_json::from_slice(&STANDARD.decode(body).unwrap()).unwrap();
        assert_eq!(json["event"]["title"], "Dentist");
        assert_eq!(
            json["exp"],
            (issued_at() + Duration::hours(24)).timestamp_millis()
        );
    }

    #[test]
    fn test_same_instant_is_deterministic() {
        let codec = TokenCodec::new("s3cr3t").unwrap();
        let first = codec.encode_at(&dentist(), issued_at()).unwrap();
        let second = codec.encode_at(&dentist(), issued_at()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert_eq!(TokenCodec::new("").unwrap_err(), TokenError::MissingSecret);
        assert_eq!(
            encode(&dentist(), "", Duration::hours(1)).unwrap_err(),
            TokenError::MissingSecret
        );
    }

    #[test]
    fn test_uppercase_signature_does_not_verify() {
        let codec = TokenCodec::new("s3cr3t").unwrap();
        let token = codec.encode_at(&dentist(), issued_at()).unwrap();
        let (body, signature) = token.split_once('.').unwrap();
        let shouted = format!("{body}.{}", signature.to_uppercase());

        if shouted != token {
            assert_eq!(
                codec.decode_at(&shouted, issued_at()),
                Err(TokenError::SignatureMismatch)
            );
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = TokenCodec::new("s3cr3t").unwrap();
        let token = codec.encode_at(&dentist(), issued_at()).unwrap();
        let exp = issued_at() + Duration::hours(24);

        assert!(codec
            .decode_at(&token, exp - Duration::milliseconds(1))
            .is_ok());
        assert_eq!(codec.decode_at(&token, exp), Err(TokenError::Expired));
    }
}
