use miette::Diagnostic;
use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Environment error: {0}")]
    #[diagnostic(code(snapcal::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(snapcal::config),
        help("check APP_SECRET_KEY and the other variables in your .env file")
    )]
    Config(String),

    #[error("Google Calendar API error: {0}")]
    #[diagnostic(code(snapcal::google_calendar))]
    GoogleCalendar(String),

    #[error("Google authorization expired or was rejected")]
    #[diagnostic(code(snapcal::google_unauthorized))]
    GoogleUnauthorized,

    #[error("Gmail API error: {0}")]
    #[diagnostic(code(snapcal::gmail))]
    Gmail(String),

    #[error("Event extraction error: {0}")]
    #[diagnostic(code(snapcal::extraction))]
    Extraction(String),

    #[error("Email error: {0}")]
    #[diagnostic(code(snapcal::email))]
    Email(String),

    #[error("Storage error: {0}")]
    #[diagnostic(code(snapcal::storage))]
    Storage(String),

    #[error("HTTP client error: {0}")]
    #[diagnostic(code(snapcal::http))]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    #[diagnostic(code(snapcal::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(snapcal::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(snapcal::other))]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Storage(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type AppResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create Google Calendar errors
pub fn google_calendar_error(message: &str) -> Error {
    Error::GoogleCalendar(message.to_string())
}

/// Helper to create Gmail errors
pub fn gmail_error(message: &str) -> Error {
    Error::Gmail(message.to_string())
}

/// Helper to create extraction errors
pub fn extraction_error(message: &str) -> Error {
    Error::Extraction(message.to_string())
}

/// Helper to create email errors
pub fn email_error(message: &str) -> Error {
    Error::Email(message.to_string())
}

/// Helper to create storage errors
pub fn storage_error(message: &str) -> Error {
    Error::Storage(message.to_string())
}

/// Helper to create other errors
pub fn other_error(message: &str) -> Error {
    Error::Other(message.to_string())
}
