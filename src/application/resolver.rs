//! Link Resolver (component B): cache-then-store short-code resolution plus
//! the off-path click-count coalescer.
//!
//! A cache-then-store-then-populate algorithm: rather than encoding the
//! redirect type as a string prefix on the cached value (`"1:{url}"`/
//! `"0:{url}"`), this resolver stores a JSON-encoded [`LinkCacheEntry`] so
//! the cache also carries `expires_at`/`enabled`, letting a hit be
//! evaluated without a DB round trip.

use crate::domain::entities::{Link, RedirectType};
use crate::domain::repositories::{LinkCacheEntry, LinkStore};
use crate::error::AppError;
use crate::infrastructure::cache::{self, CacheService, delete_through};
use crate::application::clock::Clock;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Outcome of a successful resolve: what the redirect handler needs to build
/// the HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectDecision {
    pub link_id: i64,
    pub owner_id: i64,
    pub destination: String,
    pub redirect_type: RedirectType,
    pub cache_hit: bool,
}

const CACHE_TTL_SECS: u64 = 300;

pub struct LinkResolver {
    link_store: Arc<dyn LinkStore>,
    cache: Arc<dyn CacheService>,
    clock: Arc<dyn Clock>,
    counter: Arc<ClickCounter>,
}

impl LinkResolver {
    pub fn new(
        link_store: Arc<dyn LinkStore>,
        cache: Arc<dyn CacheService>,
        clock: Arc<dyn Clock>,
        counter: Arc<ClickCounter>,
    ) -> Self {
        Self { link_store, cache, clock, counter }
    }

    /// Resolves `short_code` to a redirect decision, or a
    /// [`AppError::LinkNotFound`]/[`AppError::LinkExpired`] terminal error.
    pub async fn resolve(&self, short_code: &str) -> Result<RedirectDecision, AppError> {
        let key = cache::keys::link(short_code);

        if let Some(hit) = self.cache_lookup(&key).await {
            let now = self.clock.now();
            if hit.enabled && !hit.expires_at.is_some_and(|exp| exp <= now) {
                metrics::counter!("penshort_redirect_cache_hits_total").increment(1);
                debug!(short_code, "cache hit");
                return Ok(RedirectDecision {
                    link_id: hit.link_id,
                    owner_id: hit.owner_id,
                    destination: hit.destination,
                    redirect_type: hit.redirect_type,
                    cache_hit: true,
                });
            }
            // Stale/negative cache entry: fall through to source of truth.
        }

        metrics::counter!("penshort_redirect_cache_misses_total").increment(1);
        debug!(short_code, "cache miss");

        let link = self
            .link_store
            .get_by_short_code(short_code)
            .await?
            .ok_or(AppError::LinkNotFound)?;

        self.evaluate_and_populate(&key, &link).await
    }

    async fn cache_lookup(&self, key: &str) -> Option<LinkCacheEntry> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache get failed, falling through to store");
                None
            }
        }
    }

    async fn evaluate_and_populate(
        &self,
        key: &str,
        link: &Link,
    ) -> Result<RedirectDecision, AppError> {
        let now = self.clock.now();
        // `get_by_short_code` already excludes soft-deleted rows, so only
        // disabled/expired/active remain here.
        if !link.enabled {
            // Disabled is intentionally indistinguishable from missing.
            return Err(AppError::LinkNotFound);
        }
        if link.is_expired_at(now) {
            // Expired entries must never be cached as active.
            return Err(AppError::LinkExpired);
        }

        let entry = LinkCacheEntry::from(link);
        if let Ok(encoded) = serde_json::to_string(&entry) {
            let cache = self.cache.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                if let Err(e) = cache.set(&key, &encoded, CACHE_TTL_SECS).await {
                    error!(key, error = %e, "failed to populate link cache");
                }
            });
        }

        self.counter.record(link.id);

        Ok(RedirectDecision {
            link_id: link.id,
            owner_id: link.owner_id,
            destination: link.destination.clone(),
            redirect_type: link.redirect_type,
            cache_hit: false,
        })
    }

    /// Invalidates the cache entry for `short_code`. Called by the link
    /// mutation path after the authoritative write commits (delete-through).
    pub async fn invalidate(&self, short_code: &str) {
        delete_through(self.cache.as_ref(), &cache::keys::link(short_code)).await;
    }
}

/// Off-path click-count coalescer: `click_count` is a hot row, so updates
/// are batched in memory and flushed periodically instead of incrementing
/// on every redirect.
///
/// A drain-on-shutdown idiom applied to in-memory delta accumulation
/// instead of one-row-per-event processing.
pub struct ClickCounter {
    link_store: Arc<dyn LinkStore>,
    pending: Mutex<HashMap<i64, i64>>,
}

impl ClickCounter {
    pub fn new(link_store: Arc<dyn LinkStore>) -> Arc<Self> {
        Arc::new(Self { link_store, pending: Mutex::new(HashMap::new()) })
    }

    /// Enqueues an increment intent for `link_id`. Never blocks on I/O.
    pub fn record(&self, link_id: i64) {
        // `try_lock` keeps this callable from the hot path without awaiting;
        // under contention it's fine to skip a tick, the next flush catches it.
        if let Ok(mut pending) = self.pending.try_lock() {
            *pending.entry(link_id).or_insert(0) += 1;
        } else {
            tracing::trace!(link_id, "click counter busy, deferring to next flush");
        }
    }

    async fn flush(&self) {
        let deltas: Vec<(i64, i64)> = {
            let mut pending = self.pending.lock().await;
            if pending.is_empty() {
                return;
            }
            pending.drain().collect()
        };

        if let Err(e) = self.link_store.apply_click_deltas(&deltas).await {
            error!(error = %e, count = deltas.len(), "failed to flush click-count deltas");
        } else {
            debug!(count = deltas.len(), "flushed click-count deltas");
        }
    }

    /// Runs the flush loop until `shutdown` fires, draining one final time
    /// before returning so no counted clicks are lost.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: tokio_util::sync::CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("click counter coalescer started");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush().await,
                _ = shutdown.cancelled() => break,
            }
        }
        self.flush().await;
        tracing::info!("click counter coalescer stopped");
    }
}
