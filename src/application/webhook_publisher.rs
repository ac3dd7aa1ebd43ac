//! Webhook Publisher (component G): fan-out insert-per-endpoint for a single
//! event.
//!
//! Runs inline, invoked by the Analytics Worker immediately after a batch's
//! click events and daily aggregates are durably persisted, rather than as
//! an independent stream consumer (see SPEC_FULL.md §9). The canonical
//! payload bytes are built exactly once here and stored verbatim in
//! `WebhookDelivery::payload_json`; the Dispatcher signs and sends those
//! bytes as-is and never re-serializes them.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::entities::{DEFAULT_MAX_ATTEMPTS, EventType, NewWebhookDelivery};
use crate::domain::repositories::{WebhookDeliveryStore, WebhookEndpointStore};

pub struct WebhookPublisher {
    endpoints: Arc<dyn WebhookEndpointStore>,
    deliveries: Arc<dyn WebhookDeliveryStore>,
}

impl WebhookPublisher {
    pub fn new(endpoints: Arc<dyn WebhookEndpointStore>, deliveries: Arc<dyn WebhookDeliveryStore>) -> Self {
        Self { endpoints, deliveries }
    }

    /// Lists `user_id`'s active endpoints subscribed to `click` and inserts
    /// one pending delivery per endpoint. `(event_id, endpoint_id)` is
    /// unique, so a redelivered click event (at-least-once from the stream)
    /// fans out idempotently — `create_if_absent` no-ops on the duplicate.
    pub async fn publish_click(&self, user_id: i64, event_id: Uuid, data: Value, now: DateTime<Utc>) -> usize {
        let endpoints = match self.endpoints.list_active_for_user(user_id, EventType::Click).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                tracing::error!(error = %e, user_id, "failed to list webhook endpoints for fan-out");
                return 0;
            }
        };

        if endpoints.is_empty() {
            return 0;
        }

        // Per spec.md §6 the body's `timestamp` field is ISO-8601 (the
        // event time baked into the canonical payload at publish time);
        // this is distinct from the unix-seconds timestamp the Dispatcher
        // computes fresh at send time for `X-Penshort-Timestamp`/the HMAC.
        let payload = serde_json::json!({
            "event_type": EventType::Click.as_str(),
            "event_id": event_id,
            "timestamp": now.to_rfc3339(),
            "data": data,
        });
        let payload_json = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, %event_id, "failed to encode webhook payload, skipping fan-out");
                return 0;
            }
        };

        let mut fanned_out = 0;
        for endpoint in endpoints {
            let new_delivery = NewWebhookDelivery {
                endpoint_id: endpoint.id,
                event_id,
                event_type: EventType::Click.as_str().to_string(),
                payload_json: payload_json.clone(),
                max_attempts: DEFAULT_MAX_ATTEMPTS,
            };
            match self.deliveries.create_if_absent(new_delivery).await {
                Ok(_) => fanned_out += 1,
                Err(e) => {
                    tracing::error!(error = %e, endpoint_id = endpoint.id, %event_id, "failed to enqueue webhook delivery")
                }
            }
        }

        if fanned_out > 0 {
            metrics::counter!("penshort_webhook_deliveries_total", "status" => "enqueued").increment(fanned_out as u64);
        }
        fanned_out
    }
}
