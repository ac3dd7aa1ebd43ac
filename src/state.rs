//! Application state shared across HTTP handlers and middleware.
//!
//! Holds the process-wide singletons built once in [`crate::server::run`]:
//! the database pool, the cache/rate-limiter/auth-verifier/resolver/click-
//! publisher, and the parsed [`Config`]. Wrapped in a single `Arc<AppState>`
//! by the router rather than cloned per component, since every field here
//! is itself already cheap to clone or shared internally.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use crate::application::auth_verifier::AuthVerifier;
use crate::application::clock::Clock;
use crate::application::click_publisher::ClickPublisher;
use crate::application::rate_limiter::RateLimiter;
use crate::application::resolver::LinkResolver;
use crate::config::Config;
use crate::infrastructure::cache::CacheService;

/// Shared application state injected into HTTP handlers via
/// `State<Arc<AppState>>`.
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub cache: Arc<dyn CacheService>,
    pub clock: Arc<dyn Clock>,
    pub resolver: Arc<LinkResolver>,
    pub auth_verifier: Arc<AuthVerifier>,
    pub rate_limiter: Arc<RateLimiter>,
    pub click_publisher: Arc<ClickPublisher>,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Current time in Unix seconds, read through the injected [`Clock`] so
    /// rate-limit decisions stay deterministic under tests.
    pub fn clock_now_secs(&self) -> i64 {
        self.clock.now().timestamp()
    }
}
