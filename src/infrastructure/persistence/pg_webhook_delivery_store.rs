//! PostgreSQL implementation of [`WebhookDeliveryStore`].
//!
//! `claim_due` uses `FOR UPDATE SKIP LOCKED` so concurrent dispatcher
//! instances never double-claim the same row, the standard Postgres queue
//! idiom; `create_if_absent` relies on the `(event_id, endpoint_id)` unique
//! index with `ON CONFLICT DO NOTHING` plus a follow-up fetch, the same
//! idempotent-insert pattern used by [`super::pg_link_store`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::entities::{DeliveryStatus, NewWebhookDelivery, WebhookDelivery};
use crate::domain::repositories::WebhookDeliveryStore;
use crate::error::AppError;

pub struct PgWebhookDeliveryStore {
    pool: Arc<PgPool>,
}

impl PgWebhookDeliveryStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

struct DeliveryRow {
    id: i64,
    endpoint_id: i64,
    event_id: Uuid,
    event_type: String,
    payload_json: Vec<u8>,
    status: String,
    attempt_count: i32,
    max_attempts: i32,
    next_retry_at: DateTime<Utc>,
    last_attempt_at: Option<DateTime<Utc>>,
    last_http_status: Option<i32>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DeliveryRow> for WebhookDelivery {
    fn from(r: DeliveryRow) -> Self {
        WebhookDelivery {
            id: r.id,
            endpoint_id: r.endpoint_id,
            event_id: r.event_id,
            event_type: r.event_type,
            payload_json: r.payload_json,
            status: DeliveryStatus::parse(&r.status).unwrap_or(DeliveryStatus::Pending),
            attempt_count: r.attempt_count,
            max_attempts: r.max_attempts,
            next_retry_at: r.next_retry_at,
            last_attempt_at: r.last_attempt_at,
            last_http_status: r.last_http_status,
            last_error: r.last_error,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[async_trait]
impl WebhookDeliveryStore for PgWebhookDeliveryStore {
    async fn create_if_absent(&self, new_delivery: NewWebhookDelivery) -> Result<WebhookDelivery, AppError> {
        let inserted = sqlx::query_as!(
            DeliveryRow,
            r#"
            INSERT INTO webhook_deliveries (endpoint_id, event_id, event_type, payload_json, max_attempts)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id, endpoint_id) DO NOTHING
            RETURNING id, endpoint_id, event_id, event_type, payload_json, status, attempt_count,
                      max_attempts, next_retry_at, last_attempt_at, last_http_status, last_error, created_at, updated_at
            "#,
            new_delivery.endpoint_id,
            new_delivery.event_id,
            new_delivery.event_type,
            new_delivery.payload_json,
            new_delivery.max_attempts,
        )
        .fetch_optional(self.pool.as_ref())
        .await?;

        if let Some(row) = inserted {
            return Ok(row.into());
        }

        self.get_by_event_and_endpoint(new_delivery.event_id, new_delivery.endpoint_id)
            .await?
            .ok_or_else(|| AppError::internal("delivery vanished after conflict", serde_json::json!({})))
    }

    async fn claim_due(&self, limit: i64, now: DateTime<Utc>) -> Result<Vec<WebhookDelivery>, AppError> {
        let rows = sqlx::query_as!(
            DeliveryRow,
            r#"
            UPDATE webhook_deliveries d
            SET status = 'pending'
            FROM (
                SELECT wd.id
                FROM webhook_deliveries wd
                JOIN webhook_endpoints we ON we.id = wd.endpoint_id
                WHERE wd.status IN ('pending', 'failed')
                  AND wd.next_retry_at <= $1
                  AND we.enabled = true
                  AND we.deleted_at IS NULL
                ORDER BY wd.next_retry_at ASC
                LIMIT $2
                FOR UPDATE OF wd SKIP LOCKED
            ) claimed
            WHERE d.id = claimed.id
            RETURNING d.id, d.endpoint_id, d.event_id, d.event_type, d.payload_json, d.status, d.attempt_count,
                      d.max_attempts, d.next_retry_at, d.last_attempt_at, d.last_http_status, d.last_error,
                      d.created_at, d.updated_at
            "#,
            now,
            limit,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(WebhookDelivery::from).collect())
    }

    async fn save(&self, delivery: &WebhookDelivery) -> Result<(), AppError> {
        sqlx::query!(
            r#"
            UPDATE webhook_deliveries SET
                status = $2,
                attempt_count = $3,
                next_retry_at = $4,
                last_attempt_at = $5,
                last_http_status = $6,
                last_error = $7,
                updated_at = $8
            WHERE id = $1
            "#,
            delivery.id,
            delivery.status.as_str(),
            delivery.attempt_count,
            delivery.next_retry_at,
            delivery.last_attempt_at,
            delivery.last_http_status,
            delivery.last_error,
            delivery.updated_at,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<WebhookDelivery>, AppError> {
        let row = sqlx::query_as!(
            DeliveryRow,
            r#"SELECT id, endpoint_id, event_id, event_type, payload_json, status, attempt_count,
                      max_attempts, next_retry_at, last_attempt_at, last_http_status, last_error, created_at, updated_at
               FROM webhook_deliveries WHERE id = $1"#,
            id
        )
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(WebhookDelivery::from))
    }

    async fn get_by_event_and_endpoint(&self, event_id: Uuid, endpoint_id: i64) -> Result<Option<WebhookDelivery>, AppError> {
        let row = sqlx::query_as!(
            DeliveryRow,
            r#"SELECT id, endpoint_id, event_id, event_type, payload_json, status, attempt_count,
                      max_attempts, next_retry_at, last_attempt_at, last_http_status, last_error, created_at, updated_at
               FROM webhook_deliveries WHERE event_id = $1 AND endpoint_id = $2"#,
            event_id,
            endpoint_id,
        )
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(WebhookDelivery::from))
    }

    async fn list_for_endpoint(
        &self,
        endpoint_id: i64,
        status: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<WebhookDelivery>, AppError> {
        let offset = (page - 1).max(0) * page_size;
        let rows = sqlx::query_as!(
            DeliveryRow,
            r#"
            SELECT id, endpoint_id, event_id, event_type, payload_json, status, attempt_count,
                   max_attempts, next_retry_at, last_attempt_at, last_http_status, last_error, created_at, updated_at
            FROM webhook_deliveries
            WHERE endpoint_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            endpoint_id,
            status,
            page_size,
            offset,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(WebhookDelivery::from).collect())
    }

    async fn reschedule_now(&self, id: i64, now: DateTime<Utc>) -> Result<WebhookDelivery, AppError> {
        let row = sqlx::query_as!(
            DeliveryRow,
            r#"
            UPDATE webhook_deliveries SET
                status = 'pending',
                next_retry_at = $2,
                updated_at = $2
            WHERE id = $1
            RETURNING id, endpoint_id, event_id, event_type, payload_json, status, attempt_count,
                      max_attempts, next_retry_at, last_attempt_at, last_http_status, last_error, created_at, updated_at
            "#,
            id,
            now,
        )
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or_else(|| AppError::not_found("webhook delivery not found"))?;

        Ok(row.into())
    }
}
