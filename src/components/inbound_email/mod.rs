//! Forwarded emails: who may send them and what we extract from them.

use crate::components::extraction::ImageInput;
use crate::error::{email_error, AppResult};
use crate::utils::secrets_match;
use mail_parser::{MessageParser, MimeHeaders};
use tracing::{info, warn};

/// Content of a forwarded email worth sending to the extractor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailContent {
    Image {
        image: ImageInput,
        filename: Option<String>,
    },
    Text(String),
}

/// Sender allow-list, matched case-insensitively by substring
#[derive(Debug, Clone, Default)]
pub struct SenderPolicy {
    allowed: Vec<String>,
}

impl SenderPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { allowed }
    }

    /// Parse a comma separated list such as `ALLOWED_EMAIL_SENDERS`
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn is_allowed(&self, from: &str) -> bool {
        if self.allowed.is_empty() {
            warn!("No allowed senders configured");
            return false;
        }
        let from = from.to_lowercase();
        self.allowed.iter().any(|allowed| from.contains(allowed.as_str()))
    }
}

/// Check the shared secret sent by the email worker.
///
/// With no secret configured every request passes, matching how the worker
/// is deployed without one during setup.
pub fn verify_webhook_secret(provided: Option<&str>, expected: Option<&str>) -> bool {
    match expected {
        None => {
            warn!("CLOUDFLARE_WEBHOOK_SECRET not configured - skipping verification");
            true
        }
        Some(expected) => provided.is_some_and(|provided| secrets_match(provided, expected)),
    }
}

/// Bare address out of a `Name <user@host>` header value
pub fn mailbox_address(from: &str) -> String {
    match (from.rfind('<'), from.rfind('>')) {
        (Some(start), Some(end)) if start < end => from[start + 1..end].trim().to_string(),
        _ => from.trim().to_string(),
    }
}

/// Pick the first image attachment, otherwise the text body
pub fn parse_email(raw: &str) -> AppResult<EmailContent> {
    let message = MessageParser::default()
        .parse(raw.as_bytes())
        .ok_or_else(|| email_error("Could not parse email"))?;

    for attachment in message.attachments() {
        let content_type = attachment
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                None => ct.ctype().to_string(),
            });

        if content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("image/"))
        {
            let filename = attachment.attachment_name().map(str::to_string);
            info!(
                "Processing image attachment: {}",
                filename.as_deref().unwrap_or("unnamed")
            );
            return Ok(EmailContent::Image {
                image: ImageInput::from_bytes(attachment.contents(), content_type.as_deref()),
                filename,
            });
        }
    }

    let text = message
        .body_text(0)
        .map(|t| t.into_owned())
        .filter(|t| !t.trim().is_empty())
        .or_else(|| message.body_html(0).map(|html| strip_tags(&html)))
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(email_error("No content found in email"));
    }

    Ok(EmailContent::Text(text))
}

fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_policy() {
        let policy = SenderPolicy::from_csv(" Alice@Example.com, ,bob@example.com");
        assert!(policy.is_allowed("Alice <alice@example.com>"));
        assert!(policy.is_allowed("BOB@EXAMPLE.COM"));
        assert!(!policy.is_allowed("mallory@example.net"));

        assert!(!SenderPolicy::from_csv("").is_allowed("alice@example.com"));
    }

    #[test]
    fn test_webhook_secret() {
        assert!(verify_webhook_secret(None, None));
        assert!(verify_webhook_secret(Some("abc"), Some("abc")));
        assert!(!verify_webhook_secret(Some("abd"), Some("abc")));
        assert!(!verify_webhook_secret(None, Some("abc")));
    }

    #[test]
    fn test_mailbox_address() {
        assert_eq!(mailbox_address("Alice <alice@example.com>"), "alice@example.com");
        assert_eq!(mailbox_address(" alice@example.com "), "alice@example.com");
    }

    #[test]
    fn test_plain_text_email() {
        let raw = "From: alice@example.com\r\n\
                   To: events@example.com\r\n\
                   Subject: Dinner\r\n\
                   Content-Type: text/plain; charset=utf-8\r\n\
                   \r\n\
                   Dinner at Luigi's on March 3rd at 7pm.\r\n";
        match parse_email(raw).unwrap() {
            EmailContent::Text(text) => assert!(text.contains("Luigi's")),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_image_attachment_wins() {
        let raw = "From: alice@example.com\r\n\
                   Subject: Flyer\r\n\
                   MIME-Version: 1.0\r\n\
                   Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
                   \r\n\
                   --XYZ\r\n\
                   Content-Type: text/plain\r\n\
                   \r\n\
                   See attached.\r\n\
                   --XYZ\r\n\
                   Content-Type: image/png\r\n\
                   Content-Disposition: attachment; filename=\"flyer.png\"\r\n\
                   Content-Transfer-Encoding: base64\r\n\
                   \r\n\
                   iVBORw0KGgoAAAAA\r\n\
                   --XYZ--\r\n";
        match parse_email(raw).unwrap() {
            EmailContent::Image { image, filename } => {
                assert_eq!(image.media_type, "image/png");
                assert_eq!(filename.as_deref(), Some("flyer.png"));
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>Gala <b>night</b></p>"), "Gala night");
    }
}
