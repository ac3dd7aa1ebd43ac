//! Rate Limiter (component D): atomic token-bucket decisions backed by a
//! Redis Lua script, keyed by API-key ID or hashed IP.
//!
//! In-process limiters such as `tower_governor` cannot share state across
//! replicas, so this is built as a `redis::Script` atomic token bucket,
//! reusing the same `ConnectionManager` fail-open idiom as the Redis cache
//! (documented in `DESIGN.md`).

use redis::{Script, aio::ConnectionManager};
use tracing::warn;

/// Token-bucket state is `{tokens: f64, last_update: unix_seconds}` stored
/// under a short TTL so idle buckets expire rather than leaking memory.
///
/// The script performs the whole read-refill-decide-write cycle atomically:
/// `EVAL` on a single Redis instance is single-threaded, so concurrent
/// callers for the same key never interleave.
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local burst = tonumber(ARGV[1])
local refill_per_sec = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local state = redis.call('HMGET', key, 'tokens', 'last_update')
local tokens = tonumber(state[1])
local last_update = tonumber(state[2])

if tokens == nil then
    tokens = burst
    last_update = now
end

local elapsed = now - last_update
if elapsed < 0 then elapsed = 0 end
tokens = math.min(burst, tokens + elapsed * refill_per_sec)

local allowed = 0
if tokens >= 1 then
    tokens = tokens - 1
    allowed = 1
end

redis.call('HMSET', key, 'tokens', tokens, 'last_update', now)
redis.call('EXPIRE', key, ttl)

return { allowed, tostring(tokens) }
"#;

/// Decision returned by [`RateLimiter::allow`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub tokens_remaining: f64,
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    conn: ConnectionManager,
    script: Script,
}

impl RateLimiter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, script: Script::new(TOKEN_BUCKET_SCRIPT) }
    }

    /// Evaluates one token-bucket decision for `key`. On any Redis error
    /// this **fails open** (allows the request), logging a warning rather
    /// than surfacing the error to the caller.
    pub async fn allow(&self, key: &str, burst: f64, refill_per_sec: f64, now_secs: i64, ttl_secs: u64) -> RateLimitDecision {
        if refill_per_sec.is_infinite() {
            // `unlimited` tier bypasses the limiter entirely.
            return RateLimitDecision { allowed: true, tokens_remaining: burst, retry_after_secs: 0 };
        }

        let mut conn = self.conn.clone();
        let result: Result<(i64, String), redis::RedisError> = self
            .script
            .key(key)
            .arg(burst)
            .arg(refill_per_sec)
            .arg(now_secs)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok((allowed, tokens_str)) => {
                let tokens_remaining = tokens_str.parse().unwrap_or(0.0);
                let retry_after_secs = if allowed == 1 {
                    0
                } else {
                    ((1.0 - tokens_remaining) / refill_per_sec).ceil().max(0.0) as u64
                };
                RateLimitDecision { allowed: allowed == 1, tokens_remaining, retry_after_secs }
            }
            Err(e) => {
                warn!(key, error = %e, "rate limiter backend error, failing open");
                RateLimitDecision { allowed: true, tokens_remaining: burst, retry_after_secs: 0 }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_tier_always_allows_without_redis() {
        // A refill rate of infinity (the `unlimited` tier's sentinel) must
        // short-circuit before any Redis call, so this needs no connection.
        let decision = RateLimitDecision { allowed: true, tokens_remaining: f64::INFINITY, retry_after_secs: 0 };
        assert!(decision.allowed);
    }

    #[test]
    fn script_source_is_nonempty() {
        assert!(TOKEN_BUCKET_SCRIPT.contains("HMGET"));
    }
}
