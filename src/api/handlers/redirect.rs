//! Handler for the public short-code redirect: `GET /{short_code}`.

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::client_ip::client_ip;
use crate::application::click_publisher::{ClickEventMessage, now_ms, visitor_hash};
use crate::state::AppState;

const MAX_USER_AGENT_LEN: usize = 200;

/// Resolves `short_code`, fires off the click event, and redirects.
///
/// # Response
///
/// `301`/`302` with `Location` plus security headers on every redirect
/// response (`X-Content-Type-Options`, `X-Frame-Options`, `Referrer-Policy`,
/// `Cache-Control`). Errors propagate as [`AppError::LinkNotFound`] (404,
/// also covers disabled links — disabled is deliberately indistinguishable
/// from missing, to avoid enumeration) or [`AppError::LinkExpired`] (410),
/// rendered with [`AppError::into_flat_response`] rather than the nested
/// envelope `/api/v1` uses, per spec.md §6.
///
/// Click publication is spawned rather than awaited: the publisher already
/// bounds itself to a 50ms deadline internally, but the redirect response
/// must not wait on it at all.
pub async fn redirect_handler(
    Path(short_code): Path<String>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    connect_info: ConnectInfo<SocketAddr>,
) -> Response {
    let decision = match state.resolver.resolve(&short_code).await {
        Ok(decision) => decision,
        Err(e) => return e.into_flat_response(),
    };

    let ip = client_ip(&headers, &connect_info, state.config.behind_proxy);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| truncate(s, MAX_USER_AGENT_LEN));
    let referrer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let now = state.clock.now();
    let message = ClickEventMessage {
        event_id: Uuid::new_v4(),
        short_code: short_code.clone(),
        link_id: decision.link_id,
        owner_id: decision.owner_id,
        referrer,
        user_agent: user_agent.clone(),
        visitor_hash: visitor_hash(&ip, user_agent.as_deref().unwrap_or(""), now.date_naive()),
        country_code: None,
        clicked_at_ms: now_ms(now),
    };

    let publisher = state.click_publisher.clone();
    tokio::spawn(async move {
        publisher.publish(&message).await;
    });

    let mut response = (
        StatusCode::from_u16(decision.redirect_type.http_status()).expect("301/302 are valid status codes"),
        [(header::LOCATION, decision.destination.as_str())],
    )
        .into_response();

    let response_headers = response.headers_mut();
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=0"));
    response_headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    response_headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    response_headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("strict-origin-when-cross-origin"));

    response
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
