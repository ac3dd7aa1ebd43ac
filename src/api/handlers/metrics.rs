//! Prometheus text-exposition handler: `GET /metrics`.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use std::sync::Arc;

use crate::state::AppState;

/// Renders the process-wide [`metrics_exporter_prometheus::PrometheusHandle`]
/// installed at startup. All `penshort_*` counters/histograms/gauges
/// registered via the `metrics` crate macros show up here.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state.metrics_handle.render();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
