use crate::components::confirmation::{ConfirmationFlow, EventCreator, TokenCodec};
use crate::components::extraction::AnthropicExtractor;
use crate::components::gmail::GmailDelivery;
use crate::components::google_calendar::{
    CalendarNotConfigured, GoogleAuth, GoogleCalendar, GoogleCalendarClient,
};
use crate::components::upload_store::{InMemoryUploadStore, RedisUploadStore, UploadStore};
use crate::config::Config;
use crate::error::{config_error, AppResult, Error};
use crate::shutdown;
use crate::web::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load the application config
pub fn load_config() -> miette::Result<Config> {
    match Config::load() {
        Ok(config) => {
            info!("Loaded configuration: {:?}", config);
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Wire collaborators from the config
pub async fn build_state(config: Config) -> AppResult<AppState> {
    let codec = TokenCodec::new(&config.secret_key)
        .map_err(|e| config_error(&e.to_string()))?
        .with_validity(
            chrono::Duration::try_hours(config.token_ttl_hours)
                .ok_or_else(|| config_error("CONFIRMATION_TOKEN_TTL_HOURS is out of range"))?,
        );

    let google_auth = config
        .google_credentials()
        .map(|(client_id, client_secret)| GoogleAuth::new(client_id, client_secret));
    let server_auth = match (&google_auth, config.google_refresh_token.as_deref()) {
        (Some(auth), Some(refresh_token)) => Some(auth.clone().with_refresh_token(refresh_token)),
        _ => None,
    };

    let creator: Arc<dyn EventCreator> = match &server_auth {
        Some(auth) => Arc::new(GoogleCalendar::new(
            auth.clone(),
            GoogleCalendarClient::new(),
            &config.google_calendar_id,
            &config.timezone,
        )),
        None => {
            warn!("Google refresh token not configured, confirmation links cannot create events");
            Arc::new(CalendarNotConfigured)
        }
    };

    let mut flow = ConfirmationFlow::new(codec, &config.public_base_url, creator)
        .with_create_timeout(Duration::from_secs(config.calendar_timeout_secs));
    if let Some(auth) = &server_auth {
        flow = flow.with_delivery(Arc::new(
            GmailDelivery::new(auth.clone()).with_link_validity_hours(config.token_ttl_hours),
        ));
    }

    let uploads: Arc<dyn UploadStore> = match config.redis_url.as_deref() {
        Some(redis_url) => match RedisUploadStore::connect(redis_url).await {
            Ok(store) => {
                info!("Connected to Redis successfully");
                Arc::new(store)
            }
            Err(e) => {
                error!("Failed to connect to Redis: {}", e);
                info!("Using in-memory upload store as fallback");
                Arc::new(InMemoryUploadStore::new())
            }
        },
        None => {
            info!("REDIS_URL not set, using in-memory upload store");
            Arc::new(InMemoryUploadStore::new())
        }
    };

    let extractor = config
        .anthropic_api_key
        .as_deref()
        .map(|api_key| AnthropicExtractor::new(api_key, &config.anthropic_model));
    if extractor.is_none() {
        warn!("ANTHROPIC_API_KEY not set, extraction endpoints are disabled");
    }

    let mut state = AppState::new(config, flow, uploads);
    if let Some(extractor) = extractor {
        state = state.with_extractor(Arc::new(extractor));
    }
    if let Some(auth) = google_auth {
        state = state.with_google_auth(auth);
    }

    Ok(state)
}

/// Bind and serve until a shutdown signal arrives
pub async fn serve(config: Config) -> miette::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let public_base_url = config.public_base_url.clone();

    let state = build_state(config).await?;
    let app = web::router(state)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(Error::from)?;
    info!("Listening on {} ({})", addr, public_base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await
        .map_err(Error::from)?;

    info!("Server shut down");
    Ok(())
}
