//! Cache service trait and error types (component A: Cache Layer).

use async_trait::async_trait;
use std::fmt;

/// Errors that can occur during cache operations.
#[derive(Debug)]
pub enum CacheError {
    ConnectionError(String),
    OperationError(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ConnectionError(e) => write!(f, "Cache connection error: {}", e),
            Self::OperationError(e) => write!(f, "Cache operation error: {}", e),
        }
    }
}

impl std::error::Error for CacheError {}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Generic string-keyed cache over the authoritative KV store.
///
/// Callers own the key namespace (`link:<short_code>`, `auth:ctx:<sha256>`,
/// ...) and the value encoding (JSON via `serde_json`); this trait only
/// knows about raw strings and TTLs so a single implementation backs all
/// three key spaces in [`super::keys`].
///
/// Implementations must fail open: a `get` error is treated as a miss by
/// callers, never bubbled as a request failure. `health_check` is the one
/// exception, used by `/readyz`.
#[async_trait]
pub trait CacheService: Send + Sync {
    /// `Ok(None)` on miss; errors are also surfaced as `Err` here so callers
    /// can distinguish miss from backend failure when they care to (the
    /// resolver and verifier both treat either as "fall through to source of
    /// truth").
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()>;

    /// Deletes a key. Used for delete-through invalidation on link/endpoint
    /// mutation; the write path calls this *after* the authoritative write
    /// commits.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    async fn health_check(&self) -> bool;
}

/// Deletes `key`, retrying once on failure before surfacing a warning:
/// invalidation failures are logged rather than propagated to the caller.
pub async fn delete_through(cache: &dyn CacheService, key: &str) {
    if cache.delete(key).await.is_ok() {
        return;
    }
    tracing::warn!(key, "cache delete-through failed, retrying once");
    if let Err(e) = cache.delete(key).await {
        tracing::warn!(key, error = %e, "cache delete-through retry failed; entry will expire via TTL");
    }
}
