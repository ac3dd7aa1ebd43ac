//! Click Publisher (component E): non-blocking append of one compact record
//! per redirect to the durable click-events stream.
//!
//! A fire-and-forget `tokio::spawn` click-recording idiom, but trading the
//! in-process mpsc channel an earlier version used for a durable Redis
//! Stream so events survive a process restart.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

use crate::infrastructure::stream::{CLICK_EVENTS_STREAM, RedisStreamClient};

/// The compact wire record placed on `stream:click_events`. Field-for-field
/// what the Analytics Worker (4.F) decodes back into a [`crate::domain::entities::NewClickEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEventMessage {
    pub event_id: Uuid,
    pub short_code: String,
    pub link_id: i64,
    pub owner_id: i64,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub visitor_hash: String,
    pub country_code: Option<String>,
    pub clicked_at_ms: i64,
}

/// Publication must not add more than this to redirect latency; past this
/// deadline we give up and count the drop rather than block the response.
const PUBLISH_DEADLINE: Duration = Duration::from_millis(50);

/// Caps the stream at roughly this many entries via approximate trimming
/// (`MAXLEN ~`), so a stalled consumer group can't grow Redis memory unbounded.
const STREAM_MAXLEN: usize = 1_000_000;

pub struct ClickPublisher {
    stream: RedisStreamClient,
}

impl ClickPublisher {
    pub fn new(stream: RedisStreamClient) -> Self {
        Self { stream }
    }

    /// Publishes one click event. Never propagates a caller-visible error:
    /// failure or deadline overrun is recorded as a metric and swallowed, so
    /// redirect latency never blocks on publication.
    pub async fn publish(&self, message: &ClickEventMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize click event, dropping");
                metrics::counter!("penshort_analytics_events_published_total", "status" => "encode_error").increment(1);
                return;
            }
        };

        let result = tokio::time::timeout(
            PUBLISH_DEADLINE,
            self.stream.publish(CLICK_EVENTS_STREAM, &[("data", payload.as_str())], Some(STREAM_MAXLEN)),
        )
        .await;

        match result {
            Ok(Ok(_id)) => {
                metrics::counter!("penshort_analytics_events_published_total", "status" => "ok").increment(1);
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "click event publish failed");
                metrics::counter!("penshort_analytics_events_published_total", "status" => "error").increment(1);
            }
            Err(_) => {
                tracing::warn!("click event publish exceeded deadline");
                metrics::counter!("penshort_analytics_events_published_total", "status" => "timeout").increment(1);
            }
        }
    }
}

/// Stable, day-salted visitor fingerprint: `sha256("{date}|{ip}|{user_agent}")`.
/// Rotating the salt daily means the same visitor hashes differently on
/// different days, bounding how far back cross-day correlation is possible
/// while keeping same-day unique-visitor counts accurate.
pub fn visitor_hash(ip: &str, user_agent: &str, day: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(day.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(ip.as_bytes());
    hasher.update(b"|");
    hasher.update(user_agent.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn now_ms(now: DateTime<Utc>) -> i64 {
    now.timestamp_millis()
}
