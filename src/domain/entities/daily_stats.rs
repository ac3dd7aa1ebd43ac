//! The `DailyLinkStats` entity: a per-day aggregate recomputed from events.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyLinkStats {
    pub link_id: i64,
    pub date_utc: NaiveDate,
    pub total_clicks: i64,
    pub unique_visitors: i64,
    pub referrer_breakdown: HashMap<String, i64>,
    pub country_breakdown: HashMap<String, i64>,
    pub updated_at: DateTime<Utc>,
}

impl DailyLinkStats {
    /// Pure recomputation from a bucket's event rows — called by
    /// `DailyStatsStore::recompute_and_upsert` and safe to call repeatedly.
    pub fn recompute(
        link_id: i64,
        date_utc: NaiveDate,
        referrers: &[Option<String>],
        visitor_hashes: &[String],
        countries: &[Option<String>],
    ) -> Self {
        let total_clicks = visitor_hashes.len() as i64;
        let unique_visitors = visitor_hashes
            .iter()
            .collect::<std::collections::HashSet<_>>()
            .len() as i64;

        let mut referrer_breakdown: HashMap<String, i64> = HashMap::new();
        for r in referrers.iter().flatten() {
            let domain = referrer_domain(r);
            *referrer_breakdown.entry(domain).or_insert(0) += 1;
        }

        let mut country_breakdown: HashMap<String, i64> = HashMap::new();
        for c in countries.iter().flatten() {
            *country_breakdown.entry(c.clone()).or_insert(0) += 1;
        }

        Self {
            link_id,
            date_utc,
            total_clicks,
            unique_visitors,
            referrer_breakdown,
            country_breakdown,
            updated_at: Utc::now(),
        }
    }
}

fn referrer_domain(referrer: &str) -> String {
    url::Url::parse(referrer)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_else(|| referrer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn recompute_counts_totals_and_uniques() {
        let referrers = vec![
            Some("https://google.com/search".to_string()),
            Some("https://google.com/other".to_string()),
            None,
        ];
        let visitors = vec!["a".to_string(), "a".to_string(), "b".to_string()];
        let countries = vec![Some("US".to_string()), Some("US".to_string()), Some("DE".to_string())];

        let stats = DailyLinkStats::recompute(1, Utc::now().date_naive(), &referrers, &visitors, &countries);
        assert_eq!(stats.total_clicks, 3);
        assert_eq!(stats.unique_visitors, 2);
        assert_eq!(stats.referrer_breakdown.get("google.com"), Some(&2));
        assert_eq!(stats.country_breakdown.get("US"), Some(&2));
        assert_eq!(stats.country_breakdown.get("DE"), Some(&1));
    }

    #[test]
    fn recompute_is_idempotent() {
        let referrers = vec![Some("https://a.com/x".to_string())];
        let visitors = vec!["v1".to_string()];
        let countries = vec![Some("US".to_string())];
        let date = Utc::now().date_naive();

        let first = DailyLinkStats::recompute(1, date, &referrers, &visitors, &countries);
        let second = DailyLinkStats::recompute(1, date, &referrers, &visitors, &countries);
        assert_eq!(first.total_clicks, second.total_clicks);
        assert_eq!(first.unique_visitors, second.unique_visitors);
        assert_eq!(first.referrer_breakdown, second.referrer_breakdown);
    }

    #[test]
    fn empty_bucket_recomputes_to_zero() {
        let stats = DailyLinkStats::recompute(1, Utc::now().date_naive(), &[], &[], &[]);
        assert_eq!(stats.total_clicks, 0);
        assert_eq!(stats.unique_visitors, 0);
    }
}
