//! Core business entities: `Link`, `ApiKey`, `ClickEvent`, `DailyLinkStats`,
//! `WebhookEndpoint`, `WebhookDelivery`.

pub mod api_key;
pub mod click_event;
pub mod daily_stats;
pub mod link;
pub mod webhook_delivery;
pub mod webhook_endpoint;

pub use api_key::{ApiKey, NewApiKey, PresentedKey, RateLimitTier, Scope};
pub use click_event::{ClickEvent, NewClickEvent};
pub use daily_stats::DailyLinkStats;
pub use link::{Link, LinkPatch, LinkStatus, NewLink, RedirectType};
pub use webhook_delivery::{AttemptOutcome, DEFAULT_MAX_ATTEMPTS, DeliveryStatus, NewWebhookDelivery, WebhookDelivery};
pub use webhook_endpoint::{EventType, NewWebhookEndpoint, WebhookEndpoint, WebhookEndpointPatch};
