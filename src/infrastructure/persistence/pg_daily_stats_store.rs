//! PostgreSQL implementation of [`DailyStatsStore`].
//!
//! Recomputation delegates to [`DailyLinkStats::recompute`] (pure) over rows
//! fetched from [`ClickEventStore`], then upserts the aggregate with a plain
//! parameterized query.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::entities::DailyLinkStats;
use crate::domain::repositories::{ClickEventStore, DailyStatsStore};
use crate::error::AppError;

pub struct PgDailyStatsStore {
    pool: Arc<PgPool>,
    click_events: Arc<dyn ClickEventStore>,
}

impl PgDailyStatsStore {
    pub fn new(pool: Arc<PgPool>, click_events: Arc<dyn ClickEventStore>) -> Self {
        Self { pool, click_events }
    }
}

struct StatsRow {
    link_id: i64,
    date_utc: NaiveDate,
    total_clicks: i64,
    unique_visitors: i64,
    referrer_breakdown: Value,
    country_breakdown: Value,
    updated_at: chrono::DateTime<chrono::Utc>,
}

fn breakdown_to_map(v: Value) -> std::collections::HashMap<String, i64> {
    match v {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| v.as_i64().map(|n| (k, n)))
            .collect(),
        _ => Default::default(),
    }
}

impl From<StatsRow> for DailyLinkStats {
    fn from(r: StatsRow) -> Self {
        DailyLinkStats {
            link_id: r.link_id,
            date_utc: r.date_utc,
            total_clicks: r.total_clicks,
            unique_visitors: r.unique_visitors,
            referrer_breakdown: breakdown_to_map(r.referrer_breakdown),
            country_breakdown: breakdown_to_map(r.country_breakdown),
            updated_at: r.updated_at,
        }
    }
}

#[async_trait]
impl DailyStatsStore for PgDailyStatsStore {
    async fn recompute_and_upsert(&self, link_id: i64, date_utc: NaiveDate) -> Result<DailyLinkStats, AppError> {
        let bucket = self.click_events.rows_for_bucket(link_id, date_utc).await?;
        let stats = DailyLinkStats::recompute(
            link_id,
            date_utc,
            &bucket.referrers,
            &bucket.visitor_hashes,
            &bucket.countries,
        );

        let referrer_json = serde_json::to_value(&stats.referrer_breakdown)
            .map_err(|e| AppError::internal("failed to serialize referrer breakdown", serde_json::json!({ "error": e.to_string() })))?;
        let country_json = serde_json::to_value(&stats.country_breakdown)
            .map_err(|e| AppError::internal("failed to serialize country breakdown", serde_json::json!({ "error": e.to_string() })))?;

        let row = sqlx::query_as!(
            StatsRow,
            r#"
            INSERT INTO daily_link_stats
                (link_id, date_utc, total_clicks, unique_visitors, referrer_breakdown, country_breakdown, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            ON CONFLICT (link_id, date_utc) DO UPDATE SET
                total_clicks = EXCLUDED.total_clicks,
                unique_visitors = EXCLUDED.unique_visitors,
                referrer_breakdown = EXCLUDED.referrer_breakdown,
                country_breakdown = EXCLUDED.country_breakdown,
                updated_at = now()
            RETURNING link_id, date_utc, total_clicks, unique_visitors, referrer_breakdown, country_breakdown, updated_at
            "#,
            link_id,
            date_utc,
            stats.total_clicks,
            stats.unique_visitors,
            referrer_json,
            country_json,
        )
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into())
    }

    async fn get(&self, link_id: i64, date_utc: NaiveDate) -> Result<Option<DailyLinkStats>, AppError> {
        let row = sqlx::query_as!(
            StatsRow,
            r#"
            SELECT link_id, date_utc, total_clicks, unique_visitors, referrer_breakdown, country_breakdown, updated_at
            FROM daily_link_stats
            WHERE link_id = $1 AND date_utc = $2
            "#,
            link_id,
            date_utc,
        )
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(DailyLinkStats::from))
    }

    async fn range(&self, link_id: i64, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyLinkStats>, AppError> {
        let rows = sqlx::query_as!(
            StatsRow,
            r#"
            SELECT link_id, date_utc, total_clicks, unique_visitors, referrer_breakdown, country_breakdown, updated_at
            FROM daily_link_stats
            WHERE link_id = $1 AND date_utc BETWEEN $2 AND $3
            ORDER BY date_utc ASC
            "#,
            link_id,
            from,
            to,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(DailyLinkStats::from).collect())
    }
}
