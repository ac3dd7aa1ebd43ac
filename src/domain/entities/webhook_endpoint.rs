//! The `WebhookEndpoint` entity: a subscriber's configured delivery target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Click,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Click => "click",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: i64,
    pub user_id: i64,
    pub target_url: String,
    pub secret_hash: String,
    pub enabled: bool,
    pub event_types: Vec<EventType>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether new deliveries should be claimable for this endpoint.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.is_deleted()
    }

    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.event_types.contains(&event_type)
    }
}

#[derive(Debug, Clone)]
pub struct NewWebhookEndpoint {
    pub user_id: i64,
    pub target_url: String,
    pub secret_hash: String,
    pub event_types: Vec<EventType>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WebhookEndpointPatch {
    pub target_url: Option<String>,
    pub enabled: Option<bool>,
    pub event_types: Option<Vec<EventType>>,
    pub name: Option<Option<String>>,
    pub description: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(enabled: bool, deleted: bool) -> WebhookEndpoint {
        let now = Utc::now();
        WebhookEndpoint {
            id: 1,
            user_id: 1,
            target_url: "https://example.com/hook".into(),
            secret_hash: "hash".into(),
            enabled,
            event_types: vec![EventType::Click],
            name: None,
            description: None,
            deleted_at: if deleted { Some(now) } else { None },
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn active_requires_enabled_and_not_deleted() {
        assert!(endpoint(true, false).is_active());
        assert!(!endpoint(false, false).is_active());
        assert!(!endpoint(true, true).is_active());
    }

    #[test]
    fn subscribes_to_checks_event_types() {
        let e = endpoint(true, false);
        assert!(e.subscribes_to(EventType::Click));
    }
}
