//! Store contract for [`Link`] lookups, consumed by the Link Resolver (4.B).

use crate::domain::entities::{Link, LinkPatch, NewLink};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Minimum operations the resolver and coalescer need from the authoritative
/// relational store. Out of scope: the REST CRUD surface that wraps this.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Creates a new link. Errors with [`AppError::Conflict`] when
    /// `short_code` collides with a non-deleted row.
    async fn create(&self, new_link: NewLink) -> Result<Link, AppError>;

    /// Looks up a link by short code, excluding soft-deleted rows.
    async fn get_by_short_code(&self, short_code: &str) -> Result<Option<Link>, AppError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Link>, AppError>;

    async fn update(&self, id: i64, patch: LinkPatch) -> Result<Link, AppError>;

    /// Soft-deletes by setting `deleted_at`. `Ok(true)` if a row was affected.
    async fn soft_delete(&self, id: i64) -> Result<bool, AppError>;

    /// Applies coalesced click-count deltas in one statement per link,
    /// used by the off-path counter coalescer (4.B).
    async fn apply_click_deltas(&self, deltas: &[(i64, i64)]) -> Result<(), AppError>;

    async fn list_by_owner(&self, owner_id: i64, page: i64, page_size: i64)
    -> Result<Vec<Link>, AppError>;
}

/// Cache-facing projection of a [`Link`], the value stored under `link:<short_code>`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LinkCacheEntry {
    pub link_id: i64,
    pub owner_id: i64,
    pub destination: String,
    pub redirect_type: crate::domain::entities::RedirectType,
    pub expires_at: Option<DateTime<Utc>>,
    pub enabled: bool,
}

impl From<&Link> for LinkCacheEntry {
    fn from(link: &Link) -> Self {
        Self {
            link_id: link.id,
            owner_id: link.owner_id,
            destination: link.destination.clone(),
            redirect_type: link.redirect_type,
            expires_at: link.expires_at,
            enabled: link.enabled,
        }
    }
}
