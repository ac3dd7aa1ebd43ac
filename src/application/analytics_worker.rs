//! Analytics Worker (component F): consumes the click-event stream, persists
//! durable click events, and recomputes the affected daily aggregates.
//!
//! Uses a bounded-concurrency, drain-on-shutdown `JoinSet` over a Redis
//! Streams consumer group rather than a single in-process mpsc channel, so
//! work survives a worker crash instead of being lost with the channel.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::webhook_publisher::WebhookPublisher;
use crate::domain::entities::NewClickEvent;
use crate::domain::repositories::{ClickEventStore, DailyStatsStore};
use crate::infrastructure::stream::{ANALYTICS_CONSUMER_GROUP, CLICK_EVENTS_DLQ_STREAM, CLICK_EVENTS_STREAM, RedisStreamClient, StreamEntry};

/// Mirrors [`crate::application::click_publisher::ClickEventMessage`]; kept
/// as a separate type since decode failure handling differs from the
/// publisher side (the worker must dead-letter, not just log-and-drop).
#[derive(Debug, Clone, Deserialize)]
struct ClickEventMessage {
    event_id: Uuid,
    short_code: String,
    link_id: i64,
    owner_id: i64,
    referrer: Option<String>,
    user_agent: Option<String>,
    visitor_hash: String,
    country_code: Option<String>,
    clicked_at_ms: i64,
}

pub struct AnalyticsWorkerConfig {
    pub batch_size: usize,
    pub block_ms: u64,
    pub claim_interval: StdDuration,
    pub claim_min_idle_ms: u64,
}

impl Default for AnalyticsWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            block_ms: 2_000,
            claim_interval: StdDuration::from_secs(30),
            claim_min_idle_ms: 60_000,
        }
    }
}

pub struct AnalyticsWorker {
    stream: RedisStreamClient,
    click_events: Arc<dyn ClickEventStore>,
    daily_stats: Arc<dyn DailyStatsStore>,
    webhook_publisher: Arc<WebhookPublisher>,
    consumer_id: String,
    config: AnalyticsWorkerConfig,
}

impl AnalyticsWorker {
    pub fn new(
        stream: RedisStreamClient,
        click_events: Arc<dyn ClickEventStore>,
        daily_stats: Arc<dyn DailyStatsStore>,
        webhook_publisher: Arc<WebhookPublisher>,
        config: AnalyticsWorkerConfig,
    ) -> Self {
        Self {
            stream,
            click_events,
            daily_stats,
            webhook_publisher,
            consumer_id: format!("analytics-{}", Uuid::new_v4()),
            config,
        }
    }

    /// Ensures the consumer group exists, then runs the read/process/ack
    /// loop and a periodic stale-entry reclaim until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        if let Err(e) = self.stream.ensure_group(CLICK_EVENTS_STREAM, ANALYTICS_CONSUMER_GROUP).await {
            tracing::error!(error = %e, "failed to create analytics consumer group, worker exiting");
            return;
        }

        let mut claim_ticker = tokio::time::interval(self.config.claim_interval);
        claim_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(consumer_id = %self.consumer_id, "analytics worker started");
        loop {
            tokio::select! {
                result = self.stream.read_group(
                    CLICK_EVENTS_STREAM,
                    ANALYTICS_CONSUMER_GROUP,
                    &self.consumer_id,
                    self.config.batch_size,
                    self.config.block_ms,
                ) => {
                    match result {
                        Ok(entries) if !entries.is_empty() => self.process_batch(entries).await,
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "analytics worker read_group failed");
                            tokio::time::sleep(StdDuration::from_millis(500)).await;
                        }
                    }
                }
                _ = claim_ticker.tick() => self.reclaim_stale().await,
                _ = shutdown.cancelled() => break,
            }
        }
        tracing::info!(consumer_id = %self.consumer_id, "analytics worker stopped");
    }

    async fn reclaim_stale(&self) {
        match self
            .stream
            .claim_stale(
                CLICK_EVENTS_STREAM,
                ANALYTICS_CONSUMER_GROUP,
                &self.consumer_id,
                self.config.claim_min_idle_ms,
                self.config.batch_size,
            )
            .await
        {
            Ok(entries) if !entries.is_empty() => {
                tracing::info!(count = entries.len(), "reclaimed stale click-event entries");
                self.process_batch(entries).await;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "stale entry reclaim failed"),
        }
    }

    async fn process_batch(&self, entries: Vec<StreamEntry>) {
        let mut events = Vec::with_capacity(entries.len());
        let mut ack_ids = Vec::with_capacity(entries.len());

        for entry in entries {
            match decode(&entry) {
                Ok(event) => {
                    events.push(event);
                    ack_ids.push(entry.id);
                }
                Err(reason) => {
                    // ACKed immediately as part of dead-lettering itself, not
                    // batched with the valid events: otherwise a later
                    // `bulk_insert` failure would leave an already
                    // dead-lettered entry unacked, and it would be
                    // reclaimed and dead-lettered again on every retry.
                    self.dead_letter(&entry, &reason).await;
                }
            }
        }

        if events.is_empty() {
            return;
        }

        let buckets = affected_buckets(&events);
        let new_events: Vec<NewClickEvent> = events.iter().cloned().map(to_new_click_event).collect();

        match self.click_events.bulk_insert(&new_events).await {
            Ok(inserted) => {
                metrics::counter!("penshort_analytics_events_processed_total").increment(new_events.len() as u64);
                tracing::debug!(inserted, total = new_events.len(), "bulk inserted click events");
            }
            Err(e) => {
                tracing::error!(error = %e, "bulk insert of click events failed, entries remain unacked for redelivery");
                metrics::counter!("penshort_analytics_events_failed_total").increment(new_events.len() as u64);
                return;
            }
        }

        for (link_id, date_utc) in buckets {
            if let Err(e) = self.daily_stats.recompute_and_upsert(link_id, date_utc).await {
                tracing::error!(error = %e, link_id, %date_utc, "daily stats recompute failed");
            }
        }

        // Webhook fan-out runs inline right after the batch is durably
        // persisted (see SPEC_FULL.md §9): each event's delivery is
        // materialized now, then retried asynchronously by the dispatcher.
        for event in &events {
            let clicked_at = DateTime::from_timestamp_millis(event.clicked_at_ms).unwrap_or_else(Utc::now);
            let data = serde_json::json!({
                "short_code": event.short_code,
                "link_id": event.link_id,
                "referrer": event.referrer,
                "user_agent": event.user_agent,
                "visitor_hash": event.visitor_hash,
                "country_code": event.country_code,
                "clicked_at": clicked_at,
            });
            self.webhook_publisher.publish_click(event.owner_id, event.event_id, data, clicked_at).await;
        }

        self.ack(ack_ids).await;
    }

    async fn ack(&self, ids: Vec<String>) {
        if let Err(e) = self.stream.ack(CLICK_EVENTS_STREAM, ANALYTICS_CONSUMER_GROUP, &ids).await {
            tracing::warn!(error = %e, count = ids.len(), "failed to ack processed click-event entries");
        }
    }

    /// Pushes a malformed entry to the dead-letter stream and acks the
    /// original so a poison message can't block the consumer group forever.
    /// The ack happens here, tied to dead-lettering itself, rather than
    /// being folded into the batch's success-path ack.
    async fn dead_letter(&self, entry: &StreamEntry, reason: &str) {
        tracing::warn!(entry_id = %entry.id, reason, "dead-lettering unprocessable click event");
        metrics::counter!("penshort_analytics_events_dead_lettered_total").increment(1);

        let detail = entry.fields.get("data").cloned().unwrap_or_default();
        let record = serde_json::json!({
            "original_id": entry.id,
            "reason": reason,
            "detail": detail,
            "dead_lettered_at": Utc::now().to_rfc3339(),
        });
        let payload = record.to_string();

        if let Err(e) = self.stream.publish(CLICK_EVENTS_DLQ_STREAM, &[("data", payload.as_str())], None).await {
            tracing::error!(error = %e, "failed to publish to dead-letter stream");
        }

        self.ack(vec![entry.id.clone()]).await;
    }
}

fn decode(entry: &StreamEntry) -> Result<ClickEventMessage, String> {
    let raw = entry.fields.get("data").ok_or("missing data field")?;
    serde_json::from_str(raw).map_err(|e| format!("json decode failed: {e}"))
}

fn to_new_click_event(m: ClickEventMessage) -> NewClickEvent {
    let clicked_at = DateTime::from_timestamp_millis(m.clicked_at_ms).unwrap_or_else(Utc::now);
    NewClickEvent {
        event_id: m.event_id,
        link_id: m.link_id,
        short_code: m.short_code,
        referrer: m.referrer,
        user_agent: m.user_agent,
        visitor_hash: m.visitor_hash,
        country_code: m.country_code,
        clicked_at,
    }
    .truncate_user_agent()
}

fn affected_buckets(events: &[ClickEventMessage]) -> HashSet<(i64, NaiveDate)> {
    events
        .iter()
        .map(|e| {
            let clicked_at = DateTime::from_timestamp_millis(e.clicked_at_ms).unwrap_or_else(Utc::now);
            (e.link_id, clicked_at.date_naive())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message(link_id: i64, day_offset_ms: i64) -> ClickEventMessage {
        ClickEventMessage {
            event_id: Uuid::new_v4(),
            short_code: "abc".into(),
            link_id,
            owner_id: 1,
            referrer: None,
            user_agent: Some("curl/8.0".into()),
            visitor_hash: "hash".into(),
            country_code: Some("US".into()),
            clicked_at_ms: 1_700_000_000_000 + day_offset_ms,
        }
    }

    #[test]
    fn affected_buckets_dedupes_same_link_and_day() {
        let events = vec![sample_message(1, 0), sample_message(1, 1_000), sample_message(2, 0)];
        let buckets = affected_buckets(&events);
        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn decode_rejects_entry_missing_data_field() {
        let entry = StreamEntry { id: "1-0".into(), fields: Default::default() };
        assert!(decode(&entry).is_err());
    }

    #[test]
    fn decode_rejects_malformed_json() {
        let mut fields = std::collections::HashMap::new();
        fields.insert("data".to_string(), "not json".to_string());
        let entry = StreamEntry { id: "1-0".into(), fields };
        assert!(decode(&entry).is_err());
    }

    #[test]
    fn decode_accepts_well_formed_message() {
        let msg = sample_message(1, 0);
        let payload = serde_json::json!({
            "event_id": msg.event_id,
            "short_code": msg.short_code,
            "link_id": msg.link_id,
            "owner_id": msg.owner_id,
            "referrer": msg.referrer,
            "user_agent": msg.user_agent,
            "visitor_hash": msg.visitor_hash,
            "country_code": msg.country_code,
            "clicked_at_ms": msg.clicked_at_ms,
        })
        .to_string();
        let mut fields = std::collections::HashMap::new();
        fields.insert("data".to_string(), payload);
        let entry = StreamEntry { id: "1-0".into(), fields };
        assert!(decode(&entry).is_ok());
    }
}
