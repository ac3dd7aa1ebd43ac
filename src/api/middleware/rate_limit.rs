//! Rate-limiting middleware for the redirect edge and the authenticated
//! `/api/v1` mount.
//!
//! Both middleware functions call into the Redis-backed token bucket (see
//! [`crate::application::rate_limiter`]) rather than an in-process limiter,
//! so the limit is shared across replicas.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::api::client_ip::client_ip;
use crate::application::auth_verifier::AuthContext;
use crate::application::rate_limiter::RateLimitDecision;
use crate::error::AppError;
use crate::infrastructure::cache;
use crate::state::AppState;

const BUCKET_TTL_SECS: u64 = 120;

/// Stamps `X-RateLimit-Limit/Remaining/Reset` on every response per
/// spec.md §6, whether the request was allowed or not. `reset` is the unix
/// timestamp at which the bucket refills to `burst`.
fn apply_rate_limit_headers(response: &mut Response, decision: &RateLimitDecision, burst: f64, refill_per_sec: f64, now_secs: i64) {
    let headers = response.headers_mut();
    let remaining = decision.tokens_remaining.floor().max(0.0) as u64;
    let reset = if refill_per_sec > 0.0 {
        now_secs + ((burst - decision.tokens_remaining).max(0.0) / refill_per_sec).ceil() as i64
    } else {
        now_secs
    };
    if let Ok(v) = HeaderValue::from_str(&(burst.floor() as i64).to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&reset.to_string()) {
        headers.insert("x-ratelimit-reset", v);
    }
}

/// IP-keyed limiter for the public `/{short_code}` redirect path. The IP is
/// hashed before use as a cache key so raw addresses never sit in Redis.
pub async fn limit_redirects(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    connect_info: ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.rate_limit_redirect_enabled {
        return Ok(next.run(req).await);
    }

    let ip = client_ip(&headers, &connect_info, state.config.behind_proxy);
    let hash = hex::encode(Sha256::digest(ip.as_bytes()));
    let key = cache::keys::rate_limit_ip(&hash);

    let burst = state.config.rate_limit_redirect_burst as f64;
    let refill_per_sec = state.config.rate_limit_redirect_rps;
    let now_secs = chrono::Utc::now().timestamp();

    let decision = state.rate_limiter.allow(&key, burst, refill_per_sec, now_secs, BUCKET_TTL_SECS).await;

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        AppError::RateLimited { retry_after_secs: decision.retry_after_secs }.into_response()
    };
    apply_rate_limit_headers(&mut response, &decision, burst, refill_per_sec, now_secs);
    Ok(response)
}

/// API-key-keyed limiter for `/api/v1`, gated by the tier attached to the
/// request's [`AuthContext`] (inserted by [`super::auth::require_api_key`],
/// which must run first in the layer stack).
pub async fn limit_api(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.rate_limit_api_enabled {
        return Ok(next.run(req).await);
    }

    let ctx = req
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or(AppError::Unauthorized)?;

    let (refill_per_sec, burst) = ctx.rate_limit_tier.rate_and_burst();
    let key = cache::keys::rate_limit_api(ctx.api_key_id);
    let now_secs = state.clock_now_secs();

    let decision = state.rate_limiter.allow(&key, burst, refill_per_sec, now_secs, BUCKET_TTL_SECS).await;

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        AppError::RateLimited { retry_after_secs: decision.retry_after_secs }.into_response()
    };
    apply_rate_limit_headers(&mut response, &decision, burst, refill_per_sec, now_secs);
    Ok(response)
}
