//! Auth Verifier (component C): parses a presented API key, looks up
//! candidates by visible prefix, verifies against the adaptive hash in
//! constant time, and enforces a timing floor so failure modes are
//! indistinguishable externally.
//!
//! Builds on a hash-then-compare idiom, turned into a prefix-indexed,
//! multi-candidate, timing-floored verifier. Keyed HMAC-SHA256 would be fast
//! enough for an opaque bearer token, but this verifier uses `bcrypt`
//! instead, following the adaptive-hash precedent for password-grade secret
//! storage documented in `DESIGN.md`.

use crate::application::clock::Clock;
use crate::domain::entities::{ApiKey, PresentedKey};
use crate::domain::repositories::ApiKeyStore;
use crate::error::AppError;
use crate::infrastructure::cache::{self, CacheService};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Everything a request handler needs once a key has been verified.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuthContext {
    pub api_key_id: i64,
    pub user_id: i64,
    pub scopes: Vec<crate::domain::entities::Scope>,
    pub rate_limit_tier: crate::domain::entities::RateLimitTier,
}

impl From<&ApiKey> for AuthContext {
    fn from(key: &ApiKey) -> Self {
        Self {
            api_key_id: key.id,
            user_id: key.user_id,
            scopes: key.scopes.clone(),
            rate_limit_tier: key.rate_limit_tier,
        }
    }
}

const TIMING_FLOOR: Duration = Duration::from_millis(200);
const CACHE_TTL_SECS: u64 = 300;
const BCRYPT_COST: u32 = 12;

pub struct AuthVerifier {
    api_key_store: Arc<dyn ApiKeyStore>,
    cache: Arc<dyn CacheService>,
    clock: Arc<dyn Clock>,
}

impl AuthVerifier {
    pub fn new(api_key_store: Arc<dyn ApiKeyStore>, cache: Arc<dyn CacheService>, clock: Arc<dyn Clock>) -> Self {
        Self { api_key_store, cache, clock }
    }

    /// Hashes a secret for storage at key-creation time.
    pub fn hash_secret(secret: &str) -> Result<String, AppError> {
        bcrypt::hash(secret, BCRYPT_COST)
            .map_err(|e| AppError::internal("failed to hash API key secret", serde_json::json!({ "error": e.to_string() })))
    }

    /// Authenticates a presented plaintext key. Every branch — missing,
    /// malformed, unknown prefix, wrong secret, revoked — takes the same
    /// floor duration so external timing cannot distinguish them.
    pub async fn authenticate(&self, presented: &str) -> Result<AuthContext, AppError> {
        let start = tokio::time::Instant::now();
        let result = self.authenticate_inner(presented).await;
        self.enforce_timing_floor(start).await;
        result
    }

    async fn authenticate_inner(&self, presented: &str) -> Result<AuthContext, AppError> {
        let parsed = match PresentedKey::parse(presented) {
            Some(p) => p,
            None => return Err(AppError::Unauthorized),
        };

        let cache_key = cache::keys::auth_ctx(&sha256_hex(presented));
        if let Ok(Some(raw)) = self.cache.get(&cache_key).await {
            if let Ok(ctx) = serde_json::from_str::<AuthContext>(&raw) {
                metrics::counter!("penshort_auth_total", "result" => "cache_hit").increment(1);
                return Ok(ctx);
            }
        }

        let candidates = self.api_key_store.get_by_prefix(&parsed.prefix).await?;

        let matched = candidates
            .into_iter()
            .find(|candidate| candidate.is_active() && verify_secret(&parsed.secret, &candidate.key_hash));

        let key = match matched {
            Some(k) => k,
            None => {
                metrics::counter!("penshort_auth_total", "result" => "denied").increment(1);
                return Err(AppError::Unauthorized);
            }
        };

        let ctx = AuthContext::from(&key);
        if let Ok(encoded) = serde_json::to_string(&ctx) {
            let _ = self.cache.set(&cache_key, &encoded, CACHE_TTL_SECS).await;
        }

        let store = self.api_key_store.clone();
        let now = self.clock.now();
        let key_id = key.id;
        tokio::spawn(async move {
            if let Err(e) = store.touch_last_used(key_id, now).await {
                warn!(key_id, error = %e, "failed to update last_used_at");
            }
        });

        metrics::counter!("penshort_auth_total", "result" => "allowed").increment(1);
        Ok(ctx)
    }

    async fn enforce_timing_floor(&self, start: tokio::time::Instant) {
        let elapsed = start.elapsed();
        if elapsed < TIMING_FLOOR {
            tokio::time::sleep(TIMING_FLOOR - elapsed).await;
        }
    }
}

fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    bcrypt::verify(secret, stored_hash).unwrap_or(false)
}

fn sha256_hex(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::FakeClock;
    use crate::domain::entities::{RateLimitTier, Scope};
    use crate::domain::repositories::MockApiKeyStore;
    use crate::infrastructure::cache::NullCache;
    use chrono::Utc;

    fn sample_key(prefix: &str, secret_hash: String) -> ApiKey {
        ApiKey {
            id: 1,
            user_id: 42,
            key_hash: secret_hash,
            key_prefix: prefix.into(),
            scopes: vec![Scope::Read],
            rate_limit_tier: RateLimitTier::Free,
            name: "test".into(),
            revoked_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn malformed_key_is_unauthorized() {
        let store = MockApiKeyStore::new();
        let verifier = AuthVerifier::new(Arc::new(store), Arc::new(NullCache::new()), FakeClock::new(Utc::now()));
        let err = verifier.authenticate("not-a-key").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn valid_key_authenticates() {
        let secret = "deadbeef0123";
        let hash = AuthVerifier::hash_secret(secret).unwrap();
        let mut store = MockApiKeyStore::new();
        let key = sample_key("ab12cd", hash);
        store.expect_get_by_prefix().withf(|p| p == "ab12cd").returning(move |_| Ok(vec![key.clone()]));
        store.expect_touch_last_used().returning(|_, _| Ok(()));

        let verifier = AuthVerifier::new(Arc::new(store), Arc::new(NullCache::new()), FakeClock::new(Utc::now()));
        let ctx = verifier.authenticate(&format!("pk_live_ab12cd_{secret}")).await.unwrap();
        assert_eq!(ctx.user_id, 42);
    }

    #[tokio::test]
    async fn wrong_secret_is_unauthorized() {
        let hash = AuthVerifier::hash_secret("correct-secret").unwrap();
        let mut store = MockApiKeyStore::new();
        let key = sample_key("ab12cd", hash);
        store.expect_get_by_prefix().returning(move |_| Ok(vec![key.clone()]));

        let verifier = AuthVerifier::new(Arc::new(store), Arc::new(NullCache::new()), FakeClock::new(Utc::now()));
        let err = verifier.authenticate("pk_live_ab12cd_wrong-secret").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn revoked_key_is_unauthorized() {
        let secret = "deadbeef0123";
        let hash = AuthVerifier::hash_secret(secret).unwrap();
        let mut store = MockApiKeyStore::new();
        let mut key = sample_key("ab12cd", hash);
        key.revoked_at = Some(Utc::now());
        store.expect_get_by_prefix().returning(move |_| Ok(vec![key.clone()]));

        let verifier = AuthVerifier::new(Arc::new(store), Arc::new(NullCache::new()), FakeClock::new(Utc::now()));
        let err = verifier.authenticate(&format!("pk_live_ab12cd_{secret}")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn failure_modes_take_at_least_the_timing_floor() {
        let store = MockApiKeyStore::new();
        let verifier = AuthVerifier::new(Arc::new(store), Arc::new(NullCache::new()), FakeClock::new(Utc::now()));
        let start = tokio::time::Instant::now();
        let _ = verifier.authenticate("garbage").await;
        assert!(start.elapsed() >= TIMING_FLOOR);
    }
}
