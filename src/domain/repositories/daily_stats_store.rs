//! Store contract for daily aggregates, consumed by the Analytics Worker (4.F)
//! and link analytics queries.

use crate::domain::entities::DailyLinkStats;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::NaiveDate;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DailyStatsStore: Send + Sync {
    /// Recomputes `(link_id, date_utc)` from [`ClickEventStore::rows_for_bucket`]
    /// and upserts. Idempotent: calling twice with the same underlying rows
    /// yields the same stored aggregate.
    async fn recompute_and_upsert(
        &self,
        link_id: i64,
        date_utc: NaiveDate,
    ) -> Result<DailyLinkStats, AppError>;

    async fn get(&self, link_id: i64, date_utc: NaiveDate) -> Result<Option<DailyLinkStats>, AppError>;

    async fn range(
        &self,
        link_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyLinkStats>, AppError>;
}
