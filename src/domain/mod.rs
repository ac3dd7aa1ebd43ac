//! Domain layer: business entities and the store contracts they are
//! persisted through.
//!
//! # Architecture
//!
//! - [`entities`] - Core business data structures (`Link`, `ApiKey`, `ClickEvent`, ...)
//! - [`repositories`] - Store trait contracts (component K), implemented by
//!   [`crate::infrastructure::persistence`]
//!
//! The domain layer has no dependency on infrastructure or the API layer;
//! business rules live on the entities themselves (see e.g.
//! [`entities::Link::status_at`], [`entities::WebhookDelivery::apply_attempt`]).
//! Orchestration across entities and stores lives in
//! [`crate::application`].

pub mod entities;
pub mod repositories;
