//! Liveness and readiness handlers: `GET /healthz`, `GET /readyz`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

/// `GET /healthz` — process liveness only, no dependency checks.
pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct ReadyChecks {
    postgres: String,
    redis: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: ReadyChecks,
}

/// `GET /readyz` — checks the Postgres pool and the cache backend.
/// `503` if either dependency is unhealthy.
pub async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let postgres = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {e}"),
    };

    let redis = if state.cache.health_check().await {
        "ok".to_string()
    } else {
        "error: cache backend unreachable".to_string()
    };

    let healthy = postgres == "ok" && redis == "ok";
    let status = if healthy { "ok" } else { "unhealthy" };
    let code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (code, Json(ReadyResponse { status, checks: ReadyChecks { postgres, redis } }))
}
