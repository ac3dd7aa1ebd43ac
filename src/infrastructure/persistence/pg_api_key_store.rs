//! PostgreSQL implementation of [`ApiKeyStore`].
//!
//! Lookup is prefix-indexed to narrow the candidate set before the
//! constant-time hash comparison runs in [`crate::application::auth_verifier`];
//! scopes are stored as a plain array rather than a single revocable token.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::entities::{ApiKey, NewApiKey, RateLimitTier, Scope};
use crate::domain::repositories::ApiKeyStore;
use crate::error::AppError;

pub struct PgApiKeyStore {
    pool: Arc<PgPool>,
}

impl PgApiKeyStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn tier_from_str(s: &str) -> RateLimitTier {
    match s {
        "pro" => RateLimitTier::Pro,
        "unlimited" => RateLimitTier::Unlimited,
        _ => RateLimitTier::Free,
    }
}

struct ApiKeyRow {
    id: i64,
    user_id: i64,
    key_hash: String,
    key_prefix: String,
    scopes: Vec<String>,
    rate_limit_tier: String,
    name: String,
    revoked_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ApiKeyRow> for ApiKey {
    fn from(r: ApiKeyRow) -> Self {
        ApiKey {
            id: r.id,
            user_id: r.user_id,
            key_hash: r.key_hash,
            key_prefix: r.key_prefix,
            scopes: r.scopes.iter().filter_map(|s| Scope::parse(s)).collect(),
            rate_limit_tier: tier_from_str(&r.rate_limit_tier),
            name: r.name,
            revoked_at: r.revoked_at,
            last_used_at: r.last_used_at,
            created_at: r.created_at,
        }
    }
}

#[async_trait]
impl ApiKeyStore for PgApiKeyStore {
    async fn create(&self, new_key: NewApiKey) -> Result<ApiKey, AppError> {
        let scopes: Vec<String> = new_key.scopes.iter().map(|s| s.as_str().to_string()).collect();
        let row = sqlx::query_as!(
            ApiKeyRow,
            r#"
            INSERT INTO api_keys (user_id, key_hash, key_prefix, scopes, rate_limit_tier, name)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, key_hash, key_prefix, scopes, rate_limit_tier, name, revoked_at, last_used_at, created_at
            "#,
            new_key.user_id,
            new_key.key_hash,
            new_key.key_prefix,
            &scopes,
            new_key.rate_limit_tier.as_str(),
            new_key.name,
        )
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into())
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>, AppError> {
        let rows = sqlx::query_as!(
            ApiKeyRow,
            r#"
            SELECT id, user_id, key_hash, key_prefix, scopes, rate_limit_tier, name, revoked_at, last_used_at, created_at
            FROM api_keys
            WHERE key_prefix = $1 AND revoked_at IS NULL
            "#,
            prefix
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(ApiKey::from).collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ApiKey>, AppError> {
        let row = sqlx::query_as!(
            ApiKeyRow,
            r#"
            SELECT id, user_id, key_hash, key_prefix, scopes, rate_limit_tier, name, revoked_at, last_used_at, created_at
            FROM api_keys
            WHERE id = $1
            "#,
            id
        )
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(ApiKey::from))
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<ApiKey>, AppError> {
        let rows = sqlx::query_as!(
            ApiKeyRow,
            r#"
            SELECT id, user_id, key_hash, key_prefix, scopes, rate_limit_tier, name, revoked_at, last_used_at, created_at
            FROM api_keys
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
            user_id
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(ApiKey::from).collect())
    }

    async fn revoke(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query!(
            "UPDATE api_keys SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL",
            id
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query!("UPDATE api_keys SET last_used_at = $2 WHERE id = $1", id, at)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }
}
