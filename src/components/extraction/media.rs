use crate::error::{extraction_error, AppResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_MEDIA_TYPE: &str = "image/png";

/// A base64 image ready to send to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInput {
    pub data: String,
    pub media_type: String,
}

impl ImageInput {
    /// Accept raw base64 or a `data:image/...;base64,` URL, as sent by iOS
    /// Shortcuts and browsers. Whitespace and line breaks are stripped.
    pub fn from_base64(raw: &str, media_type_hint: Option<&str>) -> AppResult<Self> {
        let (data_url_type, encoded) = split_data_url(raw);
        let data: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

        if data.is_empty() {
            return Err(extraction_error("No image provided"));
        }

        let bytes = STANDARD
            .decode(&data)
            .map_err(|e| extraction_error(&format!("Image is not valid base64: {}", e)))?;

        let media_type = sniff_media_type(&bytes)
            .or(data_url_type)
            .or(media_type_hint.filter(|hint| hint.starts_with("image/")))
            .unwrap_or(DEFAULT_MEDIA_TYPE)
            .to_string();

        debug!(
            "Image input: {} bytes, media type {}",
            bytes.len(),
            media_type
        );

        Ok(Self { data, media_type })
    }

    /// Wrap raw image bytes, e.g. an email attachment
    pub fn from_bytes(bytes: &[u8], content_type: Option<&str>) -> Self {
        let media_type = sniff_media_type(bytes)
            .or(content_type.filter(|ct| ct.starts_with("image/")))
            .unwrap_or(DEFAULT_MEDIA_TYPE)
            .to_string();

        Self {
            data: STANDARD.encode(bytes),
            media_type,
        }
    }
}

fn split_data_url(raw: &str) -> (Option<&str>, &str) {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("data:") {
        if let Some((media_type, encoded)) = rest.split_once(";base64,") {
            let media_type = Some(media_type).filter(|mt| mt.starts_with("image/"));
            return (media_type, encoded);
        }
    }
    (None, trimmed)
}

/// Media types the model accepts, detected from magic bytes
fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}
