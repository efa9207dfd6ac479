//! Short-lived storage for images uploaded ahead of an extraction request.
//!
//! An upload is read at most once and disappears after [`UPLOAD_TTL_SECS`].

use crate::components::extraction::ImageInput;
use crate::error::{storage_error, AppResult};
use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

mod keys {
    pub const UPLOAD_PREFIX: &str = "snapcal:upload:";
}

/// 5 minutes
pub const UPLOAD_TTL_SECS: u64 = 5 * 60;

#[async_trait]
pub trait UploadStore: Send + Sync + 'static {
    /// Store an image and return its upload id
    async fn put(&self, image: ImageInput) -> AppResult<String>;

    /// Remove and return the image, if it exists and has not expired
    async fn take(&self, id: &str) -> AppResult<Option<ImageInput>>;
}

/// Random 16 hex character id
pub fn new_upload_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// Redis backed store using `SET .. EX` and `GETDEL`
pub struct RedisUploadStore {
    client: RedisClient,
}

impl RedisUploadStore {
    /// Open a client and make sure the server answers
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let client = RedisClient::open(redis_url)
            .map_err(|e| storage_error(&format!("Failed to create Redis client: {}", e)))?;
        let store = Self { client };
        store.get_connection().await?;
        Ok(store)
    }

    async fn get_connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| storage_error(&format!("Failed to connect to Redis: {}", e)))
    }
}

#[async_trait]
impl UploadStore for RedisUploadStore {
    async fn put(&self, image: ImageInput) -> AppResult<String> {
        let id = new_upload_id();
        let key = format!("{}{}", keys::UPLOAD_PREFIX, id);
        let json = serde_json::to_string(&image)?;

        let mut conn = self.get_connection().await?;
        conn.set_ex::<_, _, ()>(&key, &json, UPLOAD_TTL_SECS).await?;

        debug!("Stored upload {} in Redis", id);
        Ok(id)
    }

    async fn take(&self, id: &str) -> AppResult<Option<ImageInput>> {
        let key = format!("{}{}", keys::UPLOAD_PREFIX, id);
        let mut conn = self.get_connection().await?;

        let data: Option<String> = conn.get_del(&key).await?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

/// Process-local store for when Redis is not available
pub struct InMemoryUploadStore {
    entries: Mutex<HashMap<String, (ImageInput, Instant)>>,
    ttl: Duration,
}

impl Default for InMemoryUploadStore {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(UPLOAD_TTL_SECS))
    }
}

impl InMemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl UploadStore for InMemoryUploadStore {
    async fn put(&self, image: ImageInput) -> AppResult<String> {
        let id = new_upload_id();
        let now = Instant::now();

        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(id.clone(), (image, now + self.ttl));

        Ok(id)
    }

    async fn take(&self, id: &str) -> AppResult<Option<ImageInput>> {
        let mut entries = self.entries.lock().await;
        Ok(entries
            .remove(id)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(image, _)| image))
    }
}
