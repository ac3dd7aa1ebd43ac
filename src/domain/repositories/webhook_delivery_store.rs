//! Store contract for [`WebhookDelivery`]s, consumed by the Webhook Publisher
//! (4.G, fan-out insert) and Webhook Dispatcher (4.H, claim/update loop).

use crate::domain::entities::{NewWebhookDelivery, WebhookDelivery};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookDeliveryStore: Send + Sync {
    /// Inserts `status=pending, attempt_count=0`. `(event_id, endpoint_id)`
    /// is unique; a duplicate insert is a no-op and returns the existing row.
    async fn create_if_absent(&self, new_delivery: NewWebhookDelivery) -> Result<WebhookDelivery, AppError>;

    /// Claims up to `limit` deliveries with `status IN (pending, failed)`,
    /// `next_retry_at <= now`, and an active endpoint, under a row-level
    /// skip-locked acquisition so concurrent dispatchers never double-claim.
    async fn claim_due(&self, limit: i64, now: DateTime<Utc>) -> Result<Vec<WebhookDelivery>, AppError>;

    async fn save(&self, delivery: &WebhookDelivery) -> Result<(), AppError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<WebhookDelivery>, AppError>;

    async fn get_by_event_and_endpoint(
        &self,
        event_id: Uuid,
        endpoint_id: i64,
    ) -> Result<Option<WebhookDelivery>, AppError>;

    async fn list_for_endpoint(
        &self,
        endpoint_id: i64,
        status: Option<&str>,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<WebhookDelivery>, AppError>;

    /// Manual retry: resets a terminal/failed delivery back to `pending` with
    /// `next_retry_at = now`, used by `POST .../deliveries/{id}/retry`.
    async fn reschedule_now(&self, id: i64, now: DateTime<Utc>) -> Result<WebhookDelivery, AppError>;
}
