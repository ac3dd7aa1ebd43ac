//! PostgreSQL repository implementations.
//!
//! Concrete implementations of the domain store traits using SQLx for
//! type-safe SQL with compile-time verification.

pub mod pg_api_key_store;
pub mod pg_click_event_store;
pub mod pg_daily_stats_store;
pub mod pg_link_store;
pub mod pg_webhook_delivery_store;
pub mod pg_webhook_endpoint_store;

pub use pg_api_key_store::PgApiKeyStore;
pub use pg_click_event_store::PgClickEventStore;
pub use pg_daily_stats_store::PgDailyStatsStore;
pub use pg_link_store::PgLinkStore;
pub use pg_webhook_delivery_store::PgWebhookDeliveryStore;
pub use pg_webhook_endpoint_store::PgWebhookEndpointStore;
