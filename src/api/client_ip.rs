//! Client IP extraction shared by the redirect handler and the redirect-path
//! rate limiter.
//!
//! `ConnectInfo<SocketAddr>` is trusted by default; `X-Forwarded-For` /
//! `X-Real-IP` are only honored when the service is configured as sitting
//! behind a trusted reverse proxy (`BEHIND_PROXY=true`), since otherwise a
//! client could forge either header to dodge rate limiting.

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use std::net::SocketAddr;

pub fn client_ip(headers: &HeaderMap, connect_info: &ConnectInfo<SocketAddr>, behind_proxy: bool) -> String {
    if behind_proxy {
        if let Some(ip) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|s| s.trim().to_string())
        {
            return ip;
        }
        if let Some(ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            return ip.to_string();
        }
    }
    connect_info.0.ip().to_string()
}
