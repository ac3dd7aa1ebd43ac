#![allow(dead_code)]

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;

use penshort::application::auth_verifier::AuthVerifier;
use penshort::application::click_publisher::ClickPublisher;
use penshort::application::clock::{Clock, FakeClock};
use penshort::application::rate_limiter::RateLimiter;
use penshort::application::resolver::{ClickCounter, LinkResolver};
use penshort::config::Config;
use penshort::domain::entities::{Link, NewApiKey, NewLink, RateLimitTier, RedirectType, Scope};
use penshort::infrastructure::cache::RedisCache;
use penshort::infrastructure::persistence::{PgApiKeyStore, PgLinkStore};
use penshort::infrastructure::stream::RedisStreamClient;
use penshort::state::AppState;

/// Connection strings for the integration-test environment. Mirrors how
/// `sqlx::test` resolves `DATABASE_URL`; Redis has no equivalent test macro,
/// so the helper falls back to a local default when `REDIS_URL` is unset.
fn redis_test_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/test".to_string(),
        redis_url: Some(redis_test_url()),
        listen_addr: "0.0.0.0:3000".to_string(),
        log_level: "info".to_string(),
        log_format: "text".to_string(),
        behind_proxy: false,
        db_max_connections: 5,
        db_connect_timeout: 30,
        db_idle_timeout: 600,
        db_max_lifetime: 1800,
        app_port: 8080,
        read_timeout_secs: 5,
        write_timeout_secs: 10,
        shutdown_timeout_secs: 30,
        rate_limit_api_enabled: true,
        rate_limit_redirect_enabled: true,
        rate_limit_redirect_rps: 50.0,
        rate_limit_redirect_burst: 100,
        webhook_allow_insecure: true,
    }
}

/// Builds a full [`AppState`] wired exactly like [`penshort::server::run`],
/// against the given Postgres pool and a Redis instance reachable at
/// `REDIS_URL` (default `redis://127.0.0.1:6379`). The rate limiter and
/// click-event stream have no in-process fallback, so integration tests that
/// exercise the redirect path need both backends up, same as production.
pub async fn create_test_state(pool: PgPool) -> AppState {
    let config = test_config();

    let redis_cache = RedisCache::connect(&redis_test_url())
        .await
        .expect("failed to connect to test redis");
    let redis_conn = redis_cache.connection_manager();
    let cache: Arc<dyn penshort::infrastructure::cache::CacheService> = Arc::new(redis_cache);

    let pool_arc = Arc::new(pool.clone());
    let link_store = Arc::new(PgLinkStore::new(pool_arc.clone()));
    let api_key_store = Arc::new(PgApiKeyStore::new(pool_arc.clone()));

    let clock: Arc<dyn Clock> = FakeClock::new(Utc::now());
    let stream = RedisStreamClient::new(redis_conn.clone());
    let rate_limiter = Arc::new(RateLimiter::new(redis_conn.clone()));
    let auth_verifier = Arc::new(AuthVerifier::new(api_key_store.clone(), cache.clone(), clock.clone()));
    let click_counter = ClickCounter::new(link_store.clone());
    let resolver = Arc::new(LinkResolver::new(link_store.clone(), cache.clone(), clock.clone(), click_counter.clone()));
    let click_publisher = Arc::new(ClickPublisher::new(stream.clone()));

    // `.build()` rather than `.install_recorder()`: the latter installs a
    // process-global recorder, which would panic the second time a test in
    // this binary calls `create_test_state`.
    let (_recorder, metrics_handle) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build()
        .expect("failed to build prometheus recorder");

    AppState {
        config,
        pool,
        cache,
        clock,
        resolver,
        auth_verifier,
        rate_limiter,
        click_publisher,
        metrics_handle,
    }
}

/// Drops the given Redis connection's state for `keys`, so tests touching
/// the rate limiter or cache don't bleed state into the next run.
pub async fn flush_redis_keys(conn: &mut ConnectionManager, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    let _: Result<(), _> = redis::cmd("DEL").arg(keys).query_async(conn).await;
}

pub async fn create_test_user(pool: &PgPool) -> i64 {
    sqlx::query_scalar!("INSERT INTO users DEFAULT VALUES RETURNING id")
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn create_test_link(pool: &PgPool, owner_id: i64, short_code: &str, destination: &str) -> Link {
    let store = PgLinkStore::new(Arc::new(pool.clone()));
    store
        .create(NewLink {
            owner_id,
            short_code: short_code.to_string(),
            destination: destination.to_string(),
            redirect_type: RedirectType::Temporary,
            expires_at: None,
            max_clicks: None,
        })
        .await
        .unwrap()
}

pub async fn create_expired_link(pool: &PgPool, owner_id: i64, short_code: &str, destination: &str) -> Link {
    let store = PgLinkStore::new(Arc::new(pool.clone()));
    store
        .create(NewLink {
            owner_id,
            short_code: short_code.to_string(),
            destination: destination.to_string(),
            redirect_type: RedirectType::Temporary,
            expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
            max_clicks: None,
        })
        .await
        .unwrap()
}

pub async fn create_permanent_link(pool: &PgPool, owner_id: i64, short_code: &str, destination: &str) -> Link {
    let store = PgLinkStore::new(Arc::new(pool.clone()));
    store
        .create(NewLink {
            owner_id,
            short_code: short_code.to_string(),
            destination: destination.to_string(),
            redirect_type: RedirectType::Permanent,
            expires_at: None,
            max_clicks: None,
        })
        .await
        .unwrap()
}

pub async fn create_deleted_link(pool: &PgPool, owner_id: i64, short_code: &str, destination: &str) {
    let link = create_test_link(pool, owner_id, short_code, destination).await;
    let store = PgLinkStore::new(Arc::new(pool.clone()));
    store.soft_delete(link.id).await.unwrap();
}

/// Creates an active API key and returns `(api_key_id, presented_plaintext_key)`.
pub async fn create_test_api_key(
    pool: &PgPool,
    user_id: i64,
    scopes: Vec<Scope>,
    tier: RateLimitTier,
) -> (i64, String) {
    let store = PgApiKeyStore::new(Arc::new(pool.clone()));
    let secret = "deadbeef0123456789";
    let key_hash = AuthVerifier::hash_secret(secret).unwrap();
    let prefix = "abc123";

    let key = store
        .create(NewApiKey {
            user_id,
            key_hash,
            key_prefix: prefix.to_string(),
            scopes,
            rate_limit_tier: tier,
            name: "test key".to_string(),
        })
        .await
        .unwrap();

    (key.id, format!("pk_test_{prefix}_{secret}"))
}

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Injects a fixed `ConnectInfo<SocketAddr>` into every request, since
/// `TestServer` (unlike `axum::serve`) has no real peer address to report.
#[derive(Clone)]
pub struct MockConnectInfoLayer;

impl<S> tower::Layer<S> for MockConnectInfoLayer {
    type Service = MockConnectInfoService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MockConnectInfoService { inner }
    }
}

#[derive(Clone)]
pub struct MockConnectInfoService<S> {
    inner: S,
}

impl<S, B> tower::Service<axum::http::Request<B>> for MockConnectInfoService<S>
where
    S: tower::Service<axum::http::Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: axum::http::Request<B>) -> Self::Future {
        let addr: SocketAddr = "127.0.0.1:12345".parse().unwrap();
        req.extensions_mut().insert(axum::extract::ConnectInfo(addr));
        self.inner.call(req)
    }
}
