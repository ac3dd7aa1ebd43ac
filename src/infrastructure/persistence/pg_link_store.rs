//! PostgreSQL implementation of [`LinkStore`].
//!
//! Uses a CTE-insert-with-`RETURNING` idiom so the insert and the
//! shaped-row fetch happen in one round trip; `links` carries no
//! `domain_id` join here, so the shape is flatter than a multi-tenant
//! schema would need.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::entities::{Link, LinkPatch, NewLink, RedirectType};
use crate::domain::repositories::LinkStore;
use crate::error::AppError;

pub struct PgLinkStore {
    pool: Arc<PgPool>,
}

impl PgLinkStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn redirect_type_from_i16(v: i16) -> RedirectType {
    match v {
        301 => RedirectType::Permanent,
        _ => RedirectType::Temporary,
    }
}

fn redirect_type_to_i16(t: RedirectType) -> i16 {
    t.http_status() as i16
}

struct LinkRow {
    id: i64,
    owner_id: i64,
    short_code: String,
    destination: String,
    redirect_type: i16,
    enabled: bool,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
    max_clicks: Option<i64>,
    click_count: i64,
    deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<LinkRow> for Link {
    fn from(r: LinkRow) -> Self {
        Link::new(
            r.id,
            r.owner_id,
            r.short_code,
            r.destination,
            redirect_type_from_i16(r.redirect_type),
            r.enabled,
            r.expires_at,
            r.max_clicks,
            r.click_count,
            r.deleted_at,
            r.created_at,
            r.updated_at,
        )
    }
}

#[async_trait]
impl LinkStore for PgLinkStore {
    async fn create(&self, new_link: NewLink) -> Result<Link, AppError> {
        let redirect_type = redirect_type_to_i16(new_link.redirect_type);
        let row = sqlx::query_as!(
            LinkRow,
            r#"
            INSERT INTO links (owner_id, short_code, destination, redirect_type, expires_at, max_clicks)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, owner_id, short_code, destination, redirect_type,
                      enabled, expires_at, max_clicks, click_count, deleted_at, created_at, updated_at
            "#,
            new_link.owner_id,
            new_link.short_code,
            new_link.destination,
            redirect_type,
            new_link.expires_at,
            new_link.max_clicks,
        )
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into())
    }

    async fn get_by_short_code(&self, short_code: &str) -> Result<Option<Link>, AppError> {
        let row = sqlx::query_as!(
            LinkRow,
            r#"
            SELECT id, owner_id, short_code, destination, redirect_type,
                   enabled, expires_at, max_clicks, click_count, deleted_at, created_at, updated_at
            FROM links
            WHERE short_code = $1 AND deleted_at IS NULL
            "#,
            short_code
        )
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Link::from))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Link>, AppError> {
        let row = sqlx::query_as!(
            LinkRow,
            r#"
            SELECT id, owner_id, short_code, destination, redirect_type,
                   enabled, expires_at, max_clicks, click_count, deleted_at, created_at, updated_at
            FROM links
            WHERE id = $1
            "#,
            id
        )
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Link::from))
    }

    async fn update(&self, id: i64, patch: LinkPatch) -> Result<Link, AppError> {
        let update_expires = patch.expires_at.is_some();
        let new_expires = patch.expires_at.flatten();
        let update_max_clicks = patch.max_clicks.is_some();
        let new_max_clicks = patch.max_clicks.flatten();

        let row = sqlx::query_as!(
            LinkRow,
            r#"
            UPDATE links SET
                destination = COALESCE($2::TEXT, destination),
                enabled     = COALESCE($3::BOOLEAN, enabled),
                expires_at  = CASE WHEN $4 THEN $5::TIMESTAMPTZ ELSE expires_at END,
                max_clicks  = CASE WHEN $6 THEN $7::BIGINT ELSE max_clicks END,
                updated_at  = now()
            WHERE id = $1
            RETURNING id, owner_id, short_code, destination, redirect_type,
                      enabled, expires_at, max_clicks, click_count, deleted_at, created_at, updated_at
            "#,
            id,
            patch.destination,
            patch.enabled,
            update_expires,
            new_expires,
            update_max_clicks,
            new_max_clicks,
        )
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or_else(|| AppError::not_found("link not found"))?;

        Ok(row.into())
    }

    async fn soft_delete(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query!(
            "UPDATE links SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
            id
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn apply_click_deltas(&self, deltas: &[(i64, i64)]) -> Result<(), AppError> {
        if deltas.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = deltas.iter().map(|(id, _)| *id).collect();
        let counts: Vec<i64> = deltas.iter().map(|(_, c)| *c).collect();

        sqlx::query!(
            r#"
            UPDATE links l
            SET click_count = l.click_count + d.delta
            FROM UNNEST($1::bigint[], $2::bigint[]) AS d(link_id, delta)
            WHERE l.id = d.link_id
            "#,
            &ids,
            &counts,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn list_by_owner(&self, owner_id: i64, page: i64, page_size: i64) -> Result<Vec<Link>, AppError> {
        let offset = (page - 1).max(0) * page_size;
        let rows = sqlx::query_as!(
            LinkRow,
            r#"
            SELECT id, owner_id, short_code, destination, redirect_type,
                   enabled, expires_at, max_clicks, click_count, deleted_at, created_at, updated_at
            FROM links
            WHERE owner_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            owner_id,
            page_size,
            offset,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(Link::from).collect())
    }
}
