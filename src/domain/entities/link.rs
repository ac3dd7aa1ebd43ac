//! The `Link` entity: a short code mapped to a destination URL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a redirect should be cached as permanent (301) or temporary (302).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectType {
    Permanent,
    Temporary,
}

impl RedirectType {
    pub fn http_status(self) -> u16 {
        match self {
            RedirectType::Permanent => 301,
            RedirectType::Temporary => 302,
        }
    }
}

/// Computed lifecycle status of a link at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Active,
    Expired,
    Disabled,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub owner_id: i64,
    pub short_code: String,
    pub destination: String,
    pub redirect_type: RedirectType,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_clicks: Option<i64>,
    pub click_count: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Link {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: i64,
        owner_id: i64,
        short_code: String,
        destination: String,
        redirect_type: RedirectType,
        enabled: bool,
        expires_at: Option<DateTime<Utc>>,
        max_clicks: Option<i64>,
        click_count: i64,
        deleted_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            short_code,
            destination,
            redirect_type,
            enabled,
            expires_at,
            max_clicks,
            click_count,
            deleted_at,
            created_at,
            updated_at,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Time- or count-based expiry. Count-based expiry tolerates the bounded
    /// overshoot documented in the click-count coalescer design.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return true;
            }
        }
        if let Some(max) = self.max_clicks {
            if max > 0 && self.click_count >= max {
                return true;
            }
        }
        false
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> LinkStatus {
        if self.is_deleted() {
            return LinkStatus::Deleted;
        }
        if !self.enabled {
            return LinkStatus::Disabled;
        }
        if self.is_expired_at(now) {
            return LinkStatus::Expired;
        }
        LinkStatus::Active
    }
}

/// Fields required to create a new link. `short_code` is assigned by the
/// caller (generated or custom alias) before this reaches the store.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub owner_id: i64,
    pub short_code: String,
    pub destination: String,
    pub redirect_type: RedirectType,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_clicks: Option<i64>,
}

/// Partial update. `Option<T>` fields follow the double-option convention:
/// `None` leaves the field unchanged, `Some(None)` clears it, `Some(Some(v))`
/// sets it to `v`.
#[derive(Debug, Clone, Default)]
pub struct LinkPatch {
    pub destination: Option<String>,
    pub enabled: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub max_clicks: Option<Option<i64>>,
}
