//! Store contract for [`ApiKey`] lookups, consumed by the Auth Verifier (4.C).

use crate::domain::entities::{ApiKey, NewApiKey};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn create(&self, new_key: NewApiKey) -> Result<ApiKey, AppError>;

    /// Candidate keys sharing a visible prefix, active (`revoked_at IS NULL`)
    /// only. The verifier tries `key_hash` against each until one matches.
    async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>, AppError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<ApiKey>, AppError>;

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<ApiKey>, AppError>;

    async fn revoke(&self, id: i64) -> Result<bool, AppError>;

    /// Best-effort bookkeeping; callers do not block the auth path on this.
    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError>;
}
