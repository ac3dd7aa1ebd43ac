//! Store contract for [`WebhookEndpoint`]s, consumed by the Webhook Publisher (4.G).

use crate::domain::entities::{EventType, NewWebhookEndpoint, WebhookEndpoint, WebhookEndpointPatch};
use crate::error::AppError;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookEndpointStore: Send + Sync {
    async fn create(&self, new_endpoint: NewWebhookEndpoint) -> Result<WebhookEndpoint, AppError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<WebhookEndpoint>, AppError>;

    async fn update(&self, id: i64, patch: WebhookEndpointPatch) -> Result<WebhookEndpoint, AppError>;

    async fn rotate_secret(&self, id: i64, secret_hash: String) -> Result<WebhookEndpoint, AppError>;

    async fn soft_delete(&self, id: i64) -> Result<bool, AppError>;

    /// Active endpoints owned by `user_id` subscribed to `event_type`; the
    /// fan-out set for a single click.
    async fn list_active_for_user(
        &self,
        user_id: i64,
        event_type: EventType,
    ) -> Result<Vec<WebhookEndpoint>, AppError>;
}
