pub mod anthropic;
pub mod media;
pub mod models;

pub use anthropic::AnthropicExtractor;
pub use media::ImageInput;
pub use models::{ExtractedEvent, Extraction, ExtractionError};

use crate::error::AppResult;
use async_trait::async_trait;

/// Turns a screenshot or a block of text into event data
#[async_trait]
pub trait EventExtractor: Send + Sync + 'static {
    async fn extract_from_image(
        &self,
        image: &ImageInput,
        context: Option<&str>,
    ) -> AppResult<Extraction>;

    async fn extract_from_text(&self, text: &str, subject: Option<&str>) -> AppResult<Extraction>;
}
