//! PostgreSQL implementation of [`WebhookEndpointStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::entities::{EventType, NewWebhookEndpoint, WebhookEndpoint, WebhookEndpointPatch};
use crate::domain::repositories::WebhookEndpointStore;
use crate::error::AppError;

pub struct PgWebhookEndpointStore {
    pool: Arc<PgPool>,
}

impl PgWebhookEndpointStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn event_type_from_str(s: &str) -> Option<EventType> {
    match s {
        "click" => Some(EventType::Click),
        _ => None,
    }
}

struct EndpointRow {
    id: i64,
    user_id: i64,
    target_url: String,
    secret_hash: String,
    enabled: bool,
    event_types: Vec<String>,
    name: Option<String>,
    description: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EndpointRow> for WebhookEndpoint {
    fn from(r: EndpointRow) -> Self {
        WebhookEndpoint {
            id: r.id,
            user_id: r.user_id,
            target_url: r.target_url,
            secret_hash: r.secret_hash,
            enabled: r.enabled,
            event_types: r.event_types.iter().filter_map(|s| event_type_from_str(s)).collect(),
            name: r.name,
            description: r.description,
            deleted_at: r.deleted_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[async_trait]
impl WebhookEndpointStore for PgWebhookEndpointStore {
    async fn create(&self, new_endpoint: NewWebhookEndpoint) -> Result<WebhookEndpoint, AppError> {
        let event_types: Vec<String> = new_endpoint.event_types.iter().map(|t| t.as_str().to_string()).collect();
        let row = sqlx::query_as!(
            EndpointRow,
            r#"
            INSERT INTO webhook_endpoints (user_id, target_url, secret_hash, event_types, name, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, target_url, secret_hash, enabled, event_types, name, description, deleted_at, created_at, updated_at
            "#,
            new_endpoint.user_id,
            new_endpoint.target_url,
            new_endpoint.secret_hash,
            &event_types,
            new_endpoint.name,
            new_endpoint.description,
        )
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<WebhookEndpoint>, AppError> {
        let row = sqlx::query_as!(
            EndpointRow,
            r#"
            SELECT id, user_id, target_url, secret_hash, enabled, event_types, name, description, deleted_at, created_at, updated_at
            FROM webhook_endpoints
            WHERE id = $1 AND deleted_at IS NULL
            "#,
            id
        )
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(WebhookEndpoint::from))
    }

    async fn update(&self, id: i64, patch: WebhookEndpointPatch) -> Result<WebhookEndpoint, AppError> {
        let update_name = patch.name.is_some();
        let new_name = patch.name.flatten();
        let update_description = patch.description.is_some();
        let new_description = patch.description.flatten();
        let event_types: Option<Vec<String>> =
            patch.event_types.map(|types| types.iter().map(|t| t.as_str().to_string()).collect());

        let row = sqlx::query_as!(
            EndpointRow,
            r#"
            UPDATE webhook_endpoints SET
                target_url   = COALESCE($2::TEXT, target_url),
                enabled      = COALESCE($3::BOOLEAN, enabled),
                event_types  = COALESCE($4::TEXT[], event_types),
                name         = CASE WHEN $5 THEN $6::TEXT ELSE name END,
                description  = CASE WHEN $7 THEN $8::TEXT ELSE description END,
                updated_at   = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, user_id, target_url, secret_hash, enabled, event_types, name, description, deleted_at, created_at, updated_at
            "#,
            id,
            patch.target_url,
            patch.enabled,
            event_types.as_deref(),
            update_name,
            new_name,
            update_description,
            new_description,
        )
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or_else(|| AppError::not_found("webhook endpoint not found"))?;

        Ok(row.into())
    }

    async fn rotate_secret(&self, id: i64, secret_hash: String) -> Result<WebhookEndpoint, AppError> {
        let row = sqlx::query_as!(
            EndpointRow,
            r#"
            UPDATE webhook_endpoints SET secret_hash = $2, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, user_id, target_url, secret_hash, enabled, event_types, name, description, deleted_at, created_at, updated_at
            "#,
            id,
            secret_hash,
        )
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or_else(|| AppError::not_found("webhook endpoint not found"))?;

        Ok(row.into())
    }

    async fn soft_delete(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query!(
            "UPDATE webhook_endpoints SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
            id
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_active_for_user(&self, user_id: i64, event_type: EventType) -> Result<Vec<WebhookEndpoint>, AppError> {
        let event_type_str = event_type.as_str();
        let rows = sqlx::query_as!(
            EndpointRow,
            r#"
            SELECT id, user_id, target_url, secret_hash, enabled, event_types, name, description, deleted_at, created_at, updated_at
            FROM webhook_endpoints
            WHERE user_id = $1 AND enabled = true AND deleted_at IS NULL AND $2 = ANY(event_types)
            "#,
            user_id,
            event_type_str,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(WebhookEndpoint::from).collect())
    }
}
