//! The `ClickEvent` entity: one observed redirect, as durably recorded.
//!
//! Not to be confused with the wire record the Click Publisher places on the
//! stream (see [`crate::application::click_publisher::ClickEventMessage`]),
//! which carries the same fields but travels as a compact JSON envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEvent {
    pub id: i64,
    pub event_id: Uuid,
    pub link_id: i64,
    pub short_code: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub visitor_hash: String,
    pub country_code: Option<String>,
    pub clicked_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// What the Analytics Worker inserts; `id`/`created_at` are store-assigned.
#[derive(Debug, Clone)]
pub struct NewClickEvent {
    pub event_id: Uuid,
    pub link_id: i64,
    pub short_code: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub visitor_hash: String,
    pub country_code: Option<String>,
    pub clicked_at: DateTime<Utc>,
}

const MAX_USER_AGENT_LEN: usize = 200;

impl NewClickEvent {
    /// Truncates `user_agent` to the invariant's 200-character ceiling.
    /// Truncation is applied at the UTF-8 char boundary, not the byte index.
    pub fn truncate_user_agent(mut self) -> Self {
        if let Some(ua) = &self.user_agent {
            if ua.chars().count() > MAX_USER_AGENT_LEN {
                self.user_agent = Some(ua.chars().take(MAX_USER_AGENT_LEN).collect());
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ua: &str) -> NewClickEvent {
        NewClickEvent {
            event_id: Uuid::new_v4(),
            link_id: 1,
            short_code: "abc".into(),
            referrer: None,
            user_agent: Some(ua.to_string()),
            visitor_hash: "deadbeef".into(),
            country_code: None,
            clicked_at: Utc::now(),
        }
    }

    #[test]
    fn leaves_short_user_agent_untouched() {
        let e = sample("Mozilla/5.0").truncate_user_agent();
        assert_eq!(e.user_agent.unwrap(), "Mozilla/5.0");
    }

    #[test]
    fn truncates_long_user_agent_to_200_chars() {
        let long = "A".repeat(500);
        let e = sample(&long).truncate_user_agent();
        assert_eq!(e.user_agent.unwrap().chars().count(), 200);
    }
}
