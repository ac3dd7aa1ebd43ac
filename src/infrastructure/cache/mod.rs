//! Caching layer for fast redirect lookups.
//!
//! Provides a [`CacheService`] trait with two implementations:
//! - [`RedisCache`] - Production Redis-backed cache
//! - [`NullCache`] - No-op implementation for testing/disabled caching

mod null_cache;
mod redis_cache;
mod service;

pub use null_cache::NullCache;
pub use redis_cache::RedisCache;
pub use service::{CacheError, CacheResult, CacheService, delete_through};

/// Cache key namespaces.
pub mod keys {
    pub fn link(short_code: &str) -> String {
        format!("link:{short_code}")
    }

    pub fn auth_ctx(sha256_hex: &str) -> String {
        format!("auth:ctx:{sha256_hex}")
    }

    pub fn rate_limit_api(key_id: i64) -> String {
        format!("rl:api:{key_id}")
    }

    pub fn rate_limit_ip(sha256_hex: &str) -> String {
        format!("rl:ip:{sha256_hex}")
    }
}
