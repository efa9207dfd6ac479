use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use snapcal::components::confirmation::token::{self, TokenCodec, TokenError};
use snapcal::models::EventPayload;

fn dentist() -> EventPayload {
    EventPayload::new(
        "Dentist",
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    )
}

fn full_event() -> EventPayload {
    EventPayload::new(
        "Käyttäjäkokous \"Q2\"",
        NaiveDate::from_ymd_opt(2025, 6, 12).unwrap(),
        NaiveTime::from_hms_opt(17, 30, 0).unwrap(),
    )
    .with_end_time(NaiveTime::from_hms_opt(19, 0, 0).unwrap())
    .with_location("Kallio Library, Helsinki")
    .with_description("Bring snacks.\nDoors open at 17:15.")
}

fn issued_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 27, 12, 0, 0).unwrap()
}

#[test]
fn test_dentist_round_trip() {
    let token = token::encode(&dentist(), "s3cr3t", Duration::hours(24)).unwrap();
    assert_eq!(token::decode(&token, "s3cr3t").unwrap(), dentist());
    assert_eq!(
        token::decode(&token, "wrong-secret"),
        Err(TokenError::SignatureMismatch)
    );
}

#[test]
fn test_round_trip_keeps_every_field() {
    let codec = TokenCodec::new("s3cr3t").unwrap();
    let token = codec.encode_at(&full_event(), issued_at()).unwrap();
    let decoded = codec
        .decode_at(&token, issued_at() + Duration::hours(1))
        .unwrap();
    assert_eq!(decoded, full_event());
}

#[test]
fn test_body_is_readable_json() {
    let codec = TokenCodec::new("s3cr3t").unwrap();
    let token = codec.encode_at(&dentist(), issued_at()).unwrap();
    let (body, signature) = token.split_once('.').unwrap();

    assert_eq!(signature.len(), 64);
    assert!(signature.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));

    let json: serde_json::Value = serde_json::from_slice(&STANDARD.decode(body).unwrap()).unwrap();
    assert_eq!(json["event"]["title"], "Dentist");
    assert_eq!(json["event"]["startTime"], "09:00");
    assert_eq!(
        json["exp"],
        (issued_at() + Duration::hours(24)).timestamp_millis()
    );
}

#[test]
fn test_any_signature_change_is_rejected() {
    let codec = TokenCodec::new("s3cr3t").unwrap();
    let token = codec.encode_at(&dentist(), issued_at()).unwrap();
    let (body, signature) = token.split_once('.').unwrap();

    for index in 0..signature.len() {
        let mut chars: Vec<char> = signature.chars().collect();
        chars[index] = if chars[index] == '0' { '1' } else { '0' };
        let tampered = format!("{}.{}", body, chars.into_iter().collect::<String>());
        assert_eq!(
            codec.decode_at(&tampered, issued_at()),
            Err(TokenError::SignatureMismatch),
            "signature position {index}"
        );
    }

    let upper = format!("{}.{}", body, signature.to_uppercase());
    assert_eq!(
        codec.decode_at(&upper, issued_at()),
        Err(TokenError::SignatureMismatch)
    );
}

#[test]
fn test_body_change_is_rejected() {
    let codec = TokenCodec::new("s3cr3t").unwrap();
    let token = codec.encode_at(&dentist(), issued_at()).unwrap();
    let (_, signature) = token.split_once('.').unwrap();

    let forged_body = STANDARD.encode(
        serde_json::json!({
            "event": { "title": "Free money", "date": "2025-03-01", "startTime": "09:00" },
            "exp": i64::MAX,
        })
        .to_string(),
    );
    assert_eq!(
        codec.decode_at(&format!("{forged_body}.{signature}"), issued_at()),
        Err(TokenError::SignatureMismatch)
    );
}

#[test]
fn test_expiry_boundaries() {
    let codec = TokenCodec::new("s3cr3t").unwrap();
    let token = codec.encode_at(&dentist(), issued_at()).unwrap();
    let exp = issued_at() + Duration::hours(24);

    assert!(codec
        .decode_at(&token, exp - Duration::milliseconds(1))
        .is_ok());
    assert_eq!(codec.decode_at(&token, exp), Err(TokenError::Expired));
    assert_eq!(
        codec.decode_at(&token, exp + Duration::days(30)),
        Err(TokenError::Expired)
    );
}

#[test]
fn test_zero_validity_is_already_expired() {
    let token = token::encode(&dentist(), "s3cr3t", Duration::zero()).unwrap();
    assert_eq!(token::decode(&token, "s3cr3t"), Err(TokenError::Expired));
}

#[test]
fn test_malformed_tokens() {
    let codec = TokenCodec::new("s3cr3t").unwrap();
    let valid = codec.encode_at(&dentist(), issued_at()).unwrap();

    let extra_part = format!("{valid}.extra");
    for token in ["", "no-separator", "a.b.c", extra_part.as_str()] {
        assert_eq!(
            codec.decode_at(token, issued_at()),
            Err(TokenError::MalformedToken),
            "{token:?}"
        );
    }

    // Correctly signed bodies that do not hold a token
    let not_base64 = "%%%not-base64%%%".to_string();
    let not_json = STANDARD.encode("definitely not json");
    let wrong_shape = STANDARD.encode(r#"{"event":{"title":"x"},"exp":1}"#);

    for body in [not_base64, not_json, wrong_shape] {
        let token = format!("{}.{}", body, hmac_hex("s3cr3t", &body));
        assert_eq!(
            codec.decode_at(&token, issued_at()),
            Err(TokenError::MalformedToken),
            "{body:?}"
        );
    }
}

#[test]
fn test_missing_secret() {
    assert_eq!(TokenCodec::new("").unwrap_err(), TokenError::MissingSecret);
    assert_eq!(
        token::encode(&dentist(), "", Duration::hours(1)),
        Err(TokenError::MissingSecret)
    );
}

#[test]
fn test_validity_override() {
    let codec = TokenCodec::new("s3cr3t")
        .unwrap()
        .with_validity(Duration::hours(2));
    assert_eq!(codec.validity(), Duration::hours(2));

    let token = codec.encode_at(&dentist(), issued_at()).unwrap();
    assert!(codec
        .decode_at(&token, issued_at() + Duration::minutes(119))
        .is_ok());
    assert_eq!(
        codec.decode_at(&token, issued_at() + Duration::hours(2)),
        Err(TokenError::Expired)
    );
}

#[test]
fn test_unrepresentable_expiry_is_an_error() {
    let codec = TokenCodec::new("s3cr3t")
        .unwrap()
        .with_validity(Duration::days(100_000_000));
    assert_eq!(
        codec.encode_at(&dentist(), issued_at()),
        Err(TokenError::ExpiryOutOfRange)
    );
    assert_eq!(
        token::encode(&dentist(), "s3cr3t", Duration::MAX),
        Err(TokenError::ExpiryOutOfRange)
    );
}

fn hmac_hex(secret: &str, body: &str) -> String {
    use hmac::{Hmac, Mac};
    let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
