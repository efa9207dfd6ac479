use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::warn;

/// Result page shown after a confirmation link or quick create
#[derive(Template)]
#[template(path = "result.html", escape = "html")]
pub struct ResultPage {
    pub heading: String,
    pub message: String,
    pub success: bool,
    pub details: Vec<String>,
    pub calendar_link: Option<String>,
}

impl ResultPage {
    pub fn success(heading: &str, message: String) -> Self {
        Self {
            heading: heading.to_string(),
            message,
            success: true,
            details: Vec::new(),
            calendar_link: None,
        }
    }

    pub fn failure(heading: &str, message: &str) -> Self {
        Self {
            heading: heading.to_string(),
            message: message.to_string(),
            success: false,
            details: Vec::new(),
            calendar_link: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_calendar_link(mut self, link: Option<String>) -> Self {
        self.calendar_link = link;
        self
    }

    pub fn into_response_with(self, status: StatusCode) -> Response {
        match self.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                warn!("Failed to render result page: {}", e);
                (status, self.message).into_response()
            }
        }
    }
}
