//! Redis-backed implementation of [`CacheService`].

use super::service::{CacheError, CacheResult, CacheService};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::{debug, error, info, warn};

/// Thin wrapper around a `ConnectionManager`. Cheap to clone; safe to share
/// across the resolver, auth verifier and rate limiter.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connects to Redis and validates the connection with a `PING`.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        info!("Connecting to Redis at {}", redacted(redis_url));

        let client = Client::open(redis_url).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {}", e))
        })?;

        let manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        let mut test_conn = manager.clone();
        test_conn
            .ping::<()>()
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Redis PING failed: {}", e)))?;

        info!("Connected to Redis");

        Ok(Self { conn: manager })
    }

    /// Exposes the underlying connection manager for components that need
    /// raw Redis access the `CacheService` abstraction doesn't cover: the
    /// rate limiter's Lua script and the click stream's `XADD`/`XREADGROUP`.
    pub fn connection_manager(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl CacheService for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(v)) => {
                debug!(key, "cache hit");
                Ok(Some(v))
            }
            Ok(None) => {
                debug!(key, "cache miss");
                Ok(None)
            }
            Err(e) => {
                error!(key, error = %e, "redis GET error");
                Err(CacheError::OperationError(e.to_string()))
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        match conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(key, error = %e, "redis SET error");
                Err(CacheError::OperationError(e.to_string()))
            }
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        match conn.del::<_, i64>(key).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(key, error = %e, "redis DEL error");
                Err(CacheError::OperationError(e.to_string()))
            }
        }
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        conn.ping::<()>().await.is_ok()
    }
}

/// Masks credentials in a `redis://[:pass@]host:port/db` URL for logging.
fn redacted(url: &str) -> String {
    if let Some(at) = url.rfind('@') {
        if let Some(scheme_end) = url.find("://") {
            return format!("{}://***@{}", &url[..scheme_end], &url[at + 1..]);
        }
    }
    url.to_string()
}
