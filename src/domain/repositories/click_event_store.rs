//! Store contract for durable click events, consumed by the Analytics Worker (4.F).

use crate::domain::entities::NewClickEvent;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Rows needed by [`crate::domain::entities::DailyLinkStats::recompute`] for
/// one `(link_id, date_utc)` bucket.
#[derive(Debug, Clone, Default)]
pub struct BucketRows {
    pub referrers: Vec<Option<String>>,
    pub visitor_hashes: Vec<String>,
    pub countries: Vec<Option<String>>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClickEventStore: Send + Sync {
    /// Idempotent bulk insert keyed by `event_id`; duplicates are a no-op.
    /// Returns the number of rows actually inserted (for metrics).
    async fn bulk_insert(&self, events: &[NewClickEvent]) -> Result<u64, AppError>;

    /// All rows for one day bucket, source of truth for recomputation.
    async fn rows_for_bucket(
        &self,
        link_id: i64,
        date_utc: NaiveDate,
    ) -> Result<BucketRows, AppError>;
}
