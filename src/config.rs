use crate::error::{config_error, env_error, AppResult};
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use url::Url;

/// Optional file with non-secret overrides
pub const CONFIG_FILE: &str = "config/snapcal.toml";

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CALENDAR_ID: &str = "primary";
pub const DEFAULT_TIMEZONE: &str = "America/New_York";
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;
pub const DEFAULT_CALENDAR_TIMEOUT_SECS: u64 = 15;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// API key for the capture endpoints and the confirmation token secret
    pub secret_key: String,
    pub port: u16,
    /// Root of the confirmation links, without a trailing slash
    pub public_base_url: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_refresh_token: Option<String>,
    pub google_calendar_id: String,
    /// IANA timezone used for calendar entries
    pub timezone: String,
    pub allowed_email_senders: Vec<String>,
    pub webhook_secret: Option<String>,
    pub allowed_origin: Option<String>,
    pub redis_url: Option<String>,
    pub token_ttl_hours: i64,
    pub calendar_timeout_secs: u64,
}

/// Settings that may come from `config/snapcal.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileOverrides {
    pub port: Option<u16>,
    pub public_base_url: Option<String>,
    pub anthropic_model: Option<String>,
    pub google_calendar_id: Option<String>,
    pub timezone: Option<String>,
    pub allowed_email_senders: Option<Vec<String>>,
    pub allowed_origin: Option<String>,
    pub token_ttl_hours: Option<i64>,
    pub calendar_timeout_secs: Option<u64>,
}

impl FileOverrides {
    /// Read overrides from `path`; a missing file means no overrides
    pub fn read(path: &Path) -> AppResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(toml::from_str(&content)?))
    }
}

impl Config {
    /// Load configuration from the environment, `.env` and the config file
    pub fn load() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let overrides = FileOverrides::read(Path::new(CONFIG_FILE))?;
        Self::from_sources(|name| env::var(name).ok(), overrides)
    }

    /// Build from an arbitrary variable lookup, without a config file
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_sources(lookup, None)
    }

    pub fn from_sources<F>(lookup: F, overrides: Option<FileOverrides>) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let secret_key = var("APP_SECRET_KEY").ok_or_else(|| env_error("APP_SECRET_KEY"))?;

        let port = match var("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| config_error(&format!("Invalid PORT: {}", raw)))?,
            None => DEFAULT_PORT,
        };
        let token_ttl_hours = match var("CONFIRMATION_TOKEN_TTL_HOURS") {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                config_error(&format!("Invalid CONFIRMATION_TOKEN_TTL_HOURS: {}", raw))
            })?,
            None => DEFAULT_TOKEN_TTL_HOURS,
        };
        let calendar_timeout_secs = match var("CALENDAR_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| config_error(&format!("Invalid CALENDAR_TIMEOUT_SECS: {}", raw)))?,
            None => DEFAULT_CALENDAR_TIMEOUT_SECS,
        };

        let mut config = Config {
            secret_key,
            port,
            public_base_url: var("PUBLIC_BASE_URL").unwrap_or_default(),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            anthropic_model: var("ANTHROPIC_MODEL").unwrap_or_else(|| {
                crate::components::extraction::anthropic::DEFAULT_MODEL.to_string()
            }),
            google_client_id: var("GOOGLE_CLIENT_ID"),
            google_client_secret: var("GOOGLE_CLIENT_SECRET"),
            google_refresh_token: var("GOOGLE_REFRESH_TOKEN"),
            google_calendar_id: var("GOOGLE_CALENDAR_ID")
                .unwrap_or_else(|| DEFAULT_CALENDAR_ID.to_string()),
            timezone: var("DEFAULT_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            allowed_email_senders: var("ALLOWED_EMAIL_SENDERS")
                .map(|csv| split_list(&csv))
                .unwrap_or_default(),
            webhook_secret: var("CLOUDFLARE_WEBHOOK_SECRET"),
            allowed_origin: var("ALLOWED_ORIGIN"),
            redis_url: var("REDIS_URL"),
            token_ttl_hours,
            calendar_timeout_secs,
        };

        if let Some(overrides) = overrides {
            config.apply(overrides);
        }

        if config.public_base_url.is_empty() {
            config.public_base_url = format!("http://localhost:{}", config.port);
        }
        config.public_base_url = config.public_base_url.trim_end_matches('/').to_string();

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, overrides: FileOverrides) {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(url) = overrides.public_base_url {
            self.public_base_url = url;
        }
        if let Some(model) = overrides.anthropic_model {
            self.anthropic_model = model;
        }
        if let Some(calendar_id) = overrides.google_calendar_id {
            self.google_calendar_id = calendar_id;
        }
        if let Some(timezone) = overrides.timezone {
            self.timezone = timezone;
        }
        if let Some(senders) = overrides.allowed_email_senders {
            self.allowed_email_senders = senders;
        }
        if let Some(origin) = overrides.allowed_origin {
            self.allowed_origin = Some(origin);
        }
        if let Some(hours) = overrides.token_ttl_hours {
            self.token_ttl_hours = hours;
        }
        if let Some(secs) = overrides.calendar_timeout_secs {
            self.calendar_timeout_secs = secs;
        }
    }

    fn validate(&self) -> AppResult<()> {
        self.tz()?;

        let url = Url::parse(&self.public_base_url)
            .map_err(|e| config_error(&format!("Invalid PUBLIC_BASE_URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(config_error("PUBLIC_BASE_URL must be an http(s) URL"));
        }

        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.token_ttl_hours) {
            return Err(config_error(&format!(
                "CONFIRMATION_TOKEN_TTL_HOURS must be between 1 and {}",
                MAX_TOKEN_TTL_HOURS
            )));
        }
        if self.calendar_timeout_secs == 0 {
            return Err(config_error("CALENDAR_TIMEOUT_SECS must be positive"));
        }

        Ok(())
    }

    /// Configured timezone
    pub fn tz(&self) -> AppResult<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| config_error(&format!("Unknown timezone: {}", self.timezone)))
    }

    /// Client id and secret, when Google OAuth is set up
    pub fn google_credentials(&self) -> Option<(&str, &str)> {
        match (&self.google_client_id, &self.google_client_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("public_base_url", &self.public_base_url)
            .field("anthropic_model", &self.anthropic_model)
            .field("google_calendar_id", &self.google_calendar_id)
            .field("timezone", &self.timezone)
            .field("allowed_email_senders", &self.allowed_email_senders)
            .field("redis", &self.redis_url.is_some())
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("calendar_timeout_secs", &self.calendar_timeout_secs)
            .finish_non_exhaustive()
    }
}

fn split_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
