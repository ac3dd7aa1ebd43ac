//! HTTP server initialization and runtime setup.
//!
//! Wires every store, cache, and application-layer component into a single
//! [`AppState`], spawns the background workers (analytics worker, webhook
//! dispatcher, click counter coalescer), and runs the Axum server with
//! graceful shutdown.

use crate::api::routes::app_router;
use crate::application::analytics_worker::{AnalyticsWorker, AnalyticsWorkerConfig};
use crate::application::auth_verifier::AuthVerifier;
use crate::application::click_publisher::ClickPublisher;
use crate::application::clock::{Clock, SystemClock};
use crate::application::rate_limiter::RateLimiter;
use crate::application::resolver::{ClickCounter, LinkResolver};
use crate::application::webhook_dispatcher::{WebhookDispatcher, WebhookDispatcherConfig};
use crate::application::webhook_publisher::WebhookPublisher;
use crate::config::Config;
use crate::infrastructure::cache::RedisCache;
use crate::infrastructure::persistence::{
    PgApiKeyStore, PgClickEventStore, PgDailyStatsStore, PgLinkStore, PgWebhookDeliveryStore,
    PgWebhookEndpointStore,
};
use crate::infrastructure::stream::RedisStreamClient;
use crate::state::AppState;

use anyhow::{Context, Result};
use axum::ServiceExt;
use axum::extract::Request;
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::timeout::TimeoutLayer;

/// Runs the HTTP server with the given configuration.
///
/// Initializes the PostgreSQL pool (running pending migrations), connects
/// Redis (mandatory: the rate limiter and click-event stream have no
/// in-process fallback), builds every store/application component, spawns
/// the analytics worker, webhook dispatcher, and click-count coalescer as
/// background tasks sharing one [`CancellationToken`], then serves HTTP
/// until a shutdown signal, draining the background tasks afterwards.
///
/// # Errors
///
/// Returns an error if the database connection, migration, Redis
/// connection, or server bind fails.
pub async fn run(config: Config) -> Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_connect_timeout))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout))
        .max_lifetime(Duration::from_secs(config.db_max_lifetime))
        .connect(&config.database_url)
        .await?;
    tracing::info!("connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    // Redis backs the cache, rate limiter, and the click-event stream:
    // there is no in-process rate limiter or stream fallback, so a
    // missing/unreachable Redis is a startup failure, not a degraded mode.
    let redis_url = config
        .redis_url
        .clone()
        .context("REDIS_URL must be set: the rate limiter and click-event stream require Redis")?;
    let redis_cache = RedisCache::connect(&redis_url).await.map_err(|e| anyhow::anyhow!("failed to connect to Redis: {e}"))?;
    let redis_conn = redis_cache.connection_manager();
    let cache: Arc<dyn crate::infrastructure::cache::CacheService> = Arc::new(redis_cache);
    tracing::info!("connected to redis");

    let pool_arc = Arc::new(pool.clone());
    let link_store = Arc::new(PgLinkStore::new(pool_arc.clone()));
    let api_key_store = Arc::new(PgApiKeyStore::new(pool_arc.clone()));
    let click_event_store = Arc::new(PgClickEventStore::new(pool_arc.clone()));
    let daily_stats_store = Arc::new(PgDailyStatsStore::new(pool_arc.clone(), click_event_store.clone()));
    let webhook_endpoint_store = Arc::new(PgWebhookEndpointStore::new(pool_arc.clone()));
    let webhook_delivery_store = Arc::new(PgWebhookDeliveryStore::new(pool_arc.clone()));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stream = RedisStreamClient::new(redis_conn.clone());
    let rate_limiter = Arc::new(RateLimiter::new(redis_conn.clone()));
    let auth_verifier = Arc::new(AuthVerifier::new(api_key_store.clone(), cache.clone(), clock.clone()));
    let click_counter = ClickCounter::new(link_store.clone());
    let resolver = Arc::new(LinkResolver::new(link_store.clone(), cache.clone(), clock.clone(), click_counter.clone()));
    let click_publisher = Arc::new(ClickPublisher::new(stream.clone()));
    let webhook_publisher = Arc::new(WebhookPublisher::new(webhook_endpoint_store.clone(), webhook_delivery_store.clone()));

    let webhook_dispatcher = WebhookDispatcher::new(
        webhook_delivery_store.clone(),
        webhook_endpoint_store.clone(),
        WebhookDispatcherConfig::default(),
    )?;

    let analytics_worker = AnalyticsWorker::new(
        stream.clone(),
        click_event_store.clone(),
        daily_stats_store.clone(),
        webhook_publisher.clone(),
        AnalyticsWorkerConfig::default(),
    );

    let shutdown = CancellationToken::new();
    let click_counter_handle = tokio::spawn(click_counter.clone().run(Duration::from_millis(500), shutdown.clone()));
    let analytics_handle = tokio::spawn(analytics_worker.run(shutdown.clone()));
    let dispatcher_handle = tokio::spawn(webhook_dispatcher.run(shutdown.clone()));
    tracing::info!("background workers started");

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let state = Arc::new(AppState {
        config: config.clone(),
        pool,
        cache,
        clock,
        resolver,
        auth_verifier,
        rate_limiter,
        click_publisher,
        metrics_handle,
    });

    let app = app_router(state).layer(TimeoutLayer::new(Duration::from_secs(
        config.read_timeout_secs + config.write_timeout_secs,
    )));

    let addr = bind_addr(&config)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{addr}");

    axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("http server stopped, draining background workers...");
    shutdown.cancel();
    let drain_budget = Duration::from_secs(config.shutdown_timeout_secs);
    let _ = tokio::time::timeout(
        drain_budget,
        futures_join(click_counter_handle, analytics_handle, dispatcher_handle),
    )
    .await;
    tracing::info!("background workers stopped, shutdown complete");

    Ok(())
}

/// `APP_PORT` overrides the port component of `LISTEN` when both are set.
fn bind_addr(config: &Config) -> Result<SocketAddr> {
    let mut addr: SocketAddr = config.listen_addr.parse().context("invalid LISTEN address")?;
    addr.set_port(config.app_port);
    Ok(addr)
}

async fn futures_join(
    a: tokio::task::JoinHandle<()>,
    b: tokio::task::JoinHandle<()>,
    c: tokio::task::JoinHandle<()>,
) {
    let _ = tokio::join!(a, b, c);
}

/// Resolves on Ctrl-C (all platforms) or SIGTERM (Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
