//! PostgreSQL implementation of [`ClickEventStore`].
//!
//! Bulk insert uses `UNNEST` over parallel arrays plus `ON CONFLICT DO
//! NOTHING` for the idempotent insert-by-`event_id` contract, in a single
//! round trip regardless of batch size.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::entities::NewClickEvent;
use crate::domain::repositories::{BucketRows, ClickEventStore};
use crate::error::AppError;

pub struct PgClickEventStore {
    pool: Arc<PgPool>,
}

impl PgClickEventStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClickEventStore for PgClickEventStore {
    async fn bulk_insert(&self, events: &[NewClickEvent]) -> Result<u64, AppError> {
        if events.is_empty() {
            return Ok(0);
        }

        let event_ids: Vec<Uuid> = events.iter().map(|e| e.event_id).collect();
        let link_ids: Vec<i64> = events.iter().map(|e| e.link_id).collect();
        let short_codes: Vec<String> = events.iter().map(|e| e.short_code.clone()).collect();
        let referrers: Vec<Option<String>> = events.iter().map(|e| e.referrer.clone()).collect();
        let user_agents: Vec<Option<String>> = events.iter().map(|e| e.user_agent.clone()).collect();
        let visitor_hashes: Vec<String> = events.iter().map(|e| e.visitor_hash.clone()).collect();
        let country_codes: Vec<Option<String>> = events.iter().map(|e| e.country_code.clone()).collect();
        let clicked_ats: Vec<chrono::DateTime<chrono::Utc>> = events.iter().map(|e| e.clicked_at).collect();

        let result = sqlx::query!(
            r#"
            INSERT INTO click_events
                (event_id, link_id, short_code, referrer, user_agent, visitor_hash, country_code, clicked_at)
            SELECT * FROM UNNEST(
                $1::uuid[], $2::bigint[], $3::varchar[], $4::text[],
                $5::varchar[], $6::varchar[], $7::varchar[], $8::timestamptz[]
            )
            ON CONFLICT (event_id) DO NOTHING
            "#,
            &event_ids,
            &link_ids,
            &short_codes,
            &referrers as &[Option<String>],
            &user_agents as &[Option<String>],
            &visitor_hashes,
            &country_codes as &[Option<String>],
            &clicked_ats,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected())
    }

    async fn rows_for_bucket(&self, link_id: i64, date_utc: NaiveDate) -> Result<BucketRows, AppError> {
        let rows = sqlx::query!(
            r#"
            SELECT referrer, visitor_hash, country_code
            FROM click_events
            WHERE link_id = $1 AND clicked_at >= $2::date AND clicked_at < ($2::date + 1)
            "#,
            link_id,
            date_utc,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut bucket = BucketRows::default();
        for row in rows {
            bucket.referrers.push(row.referrer);
            bucket.visitor_hashes.push(row.visitor_hash);
            bucket.countries.push(row.country_code);
        }
        Ok(bucket)
    }
}
