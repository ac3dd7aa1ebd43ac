//! Top-level router assembly.
//!
//! A public router (redirect, healthz, readyz, metrics) layered with the
//! redirect-path rate limiter, merged with an authenticated `/api/v1` mount
//! gated by the Auth Verifier and the API-key rate limiter. The CRUD
//! handlers that would attach under `/api/v1` (link/API-key/webhook
//! management) are out of scope; this crate exposes only the mount point
//! those endpoints would nest into.

use axum::Router;
use axum::middleware;
use axum::routing::get;
use std::sync::Arc;

use crate::api::handlers::health::{healthz, readyz};
use crate::api::handlers::metrics::metrics_handler;
use crate::api::handlers::redirect::redirect_handler;
use crate::api::middleware::{auth, rate_limit, tracing};
use crate::state::AppState;

/// Builds the full application router with every layer attached, ready to
/// be served with `axum::serve`.
pub fn app_router(state: Arc<AppState>) -> Router {
    let redirect_router = Router::new()
        .route("/{short_code}", get(redirect_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::limit_redirects));

    // Auth must run before the per-key rate limiter, which reads the
    // `AuthContext` the auth middleware inserts — so it is layered first
    // (outermost, executes first for an incoming request).
    let api_v1 = Router::new()
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::limit_api));

    Router::new()
        .merge(redirect_router)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", api_v1)
        .layer(tracing::layer())
        .with_state(state)
}
