//! Application error types and HTTP response conversion.
//!
//! Defines a unified error type ([`AppError`]) that maps to HTTP status
//! codes. [`IntoResponse`] produces the nested `{"error":{"code":...,
//! "message":...}}` envelope used by the authenticated `/api/v1` surface;
//! [`AppError::into_flat_response`] produces the flat `{"error":"...",
//! "code":"..."}` body the public redirect edge uses instead.
//!
//! ## Error Categories
//!
//! - [`AppError::Validation`] - Invalid input (400 Bad Request)
//! - [`AppError::ExpiresInPast`] - `expires_at` in the past (422)
//! - [`AppError::LinkNotFound`] - Missing or disabled link (404, indistinguishable)
//! - [`AppError::LinkExpired`] - Time- or count-expired link (410)
//! - [`AppError::AliasTaken`] - Short code collision (409)
//! - [`AppError::Unauthorized`] - Auth missing/invalid (401)
//! - [`AppError::Forbidden`] - Scope insufficient (403)
//! - [`AppError::RateLimited`] - Token bucket exhausted (429)
//! - [`AppError::NotFound`] - Owned-resource lookup miss (404)
//! - [`AppError::Internal`] - Server error (500)
//!
//! ## Database Error Mapping
//!
//! SQLx errors are converted via [`From<SqlxError>`] with constraint-name
//! dispatch: `links_short_code_key` → `AliasTaken`,
//! `click_events_event_id_key` / `webhook_deliveries_event_id_endpoint_id_key`
//! → idempotent no-op conflicts surfaced as `Internal` (callers insert with
//! `ON CONFLICT DO NOTHING` precisely so these never reach here in practice).
//!
//! ## Observability
//!
//! All database errors emit metrics via `metrics::counter!` for monitoring.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::Error as SqlxError;
use validator::ValidationErrors;

/// Internal structure for JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorInfo,
}

/// Structured error information returned in API responses.
#[derive(Debug, Serialize, Clone)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub message: String,
}

/// Application-level error type with HTTP and error-code mapping.
#[derive(Debug)]
pub enum AppError {
    Validation { code: &'static str, message: String },
    ExpiresInPast,
    LinkNotFound,
    LinkExpired,
    AliasTaken,
    Unauthorized,
    Forbidden { message: String },
    RateLimited { retry_after_secs: u64 },
    NotFound { message: String },
    Internal { message: String, details: Value },
}

/// The single response body used for every auth failure mode (missing,
/// malformed, unknown prefix, wrong secret, revoked): these must stay
/// byte-identical so failure causes can't be distinguished externally.
const UNAUTHORIZED_MESSAGE: &str = "Invalid or missing API key";

impl AppError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { code, message: message.into() }
    }

    pub fn invalid_destination(message: impl Into<String>) -> Self {
        Self::validation("INVALID_DESTINATION", message)
    }

    pub fn invalid_alias(message: impl Into<String>) -> Self {
        Self::validation("INVALID_ALIAS", message)
    }

    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::validation("INVALID_URL", message)
    }

    pub fn invalid_redirect_type(message: impl Into<String>) -> Self {
        Self::validation("INVALID_REDIRECT_TYPE", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal { message: message.into(), details }
    }

    /// Converts the error into structured error info for serialization.
    pub fn to_error_info(&self) -> ErrorInfo {
        let (code, message) = match self {
            AppError::Validation { code, message } => (*code, message.clone()),
            AppError::ExpiresInPast => ("EXPIRES_IN_PAST", "expires_at must be in the future".to_string()),
            AppError::LinkNotFound => ("LINK_NOT_FOUND", "Link not found".to_string()),
            AppError::LinkExpired => ("LINK_EXPIRED", "Link has expired".to_string()),
            AppError::AliasTaken => ("ALIAS_TAKEN", "This short code is already in use".to_string()),
            AppError::Unauthorized => ("UNAUTHORIZED", UNAUTHORIZED_MESSAGE.to_string()),
            AppError::Forbidden { message } => ("FORBIDDEN", message.clone()),
            AppError::RateLimited { .. } => ("RATE_LIMITED", "Rate limit exceeded".to_string()),
            AppError::NotFound { message } => ("NOT_FOUND", message.clone()),
            AppError::Internal { message, .. } => ("INTERNAL_ERROR", message.clone()),
        };
        ErrorInfo { code, message }
    }

    /// The HTTP status this error maps to, shared by both the nested-envelope
    /// `IntoResponse` impl below and the flat-body builder the redirect edge
    /// uses.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::ExpiresInPast => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::LinkNotFound => StatusCode::NOT_FOUND,
            AppError::LinkExpired => StatusCode::GONE,
            AppError::AliasTaken => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn response_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if matches!(self, AppError::Unauthorized) {
            headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                headers.insert(header::RETRY_AFTER, v);
            }
        }
        headers
    }

    /// Renders the flat `{"error":"...","code":"..."}` body spec.md §6
    /// mandates for the public `GET /{short_code}` edge, as opposed to the
    /// nested `{"error":{"code":...,"message":...}}` envelope [`IntoResponse`]
    /// below produces for the authenticated `/api/v1` surface.
    pub fn into_flat_response(self) -> Response {
        let status = self.status_code();
        let headers = self.response_headers();
        let info = self.to_error_info();
        let body = json!({ "error": info.message, "code": info.code });
        (status, headers, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let headers = self.response_headers();
        let body = ErrorBody { error: self.to_error_info() };
        (status, headers, Json(body)).into_response()
    }
}

impl From<SqlxError> for AppError {
    fn from(e: SqlxError) -> Self {
        map_sqlx_error(e)
    }
}

/// Maps SQLx errors to application errors with detailed context.
///
/// Handles constraint violations, connection issues, and other database
/// errors with appropriate HTTP status codes and metrics emission.
pub fn map_sqlx_error(e: SqlxError) -> AppError {
    #[cfg(debug_assertions)]
    tracing::debug!(error = ?e, "full sqlx error in debug mode");

    match &e {
        SqlxError::Database(db_err) => {
            if db_err.is_unique_violation() {
                metrics::counter!("database_errors_total", "type" => "unique_violation")
                    .increment(1);

                let constraint = db_err.constraint().unwrap_or("unknown");
                match constraint {
                    "links_short_code_key" => return AppError::AliasTaken,
                    "click_events_event_id_key"
                    | "webhook_deliveries_event_id_endpoint_id_key" => {
                        tracing::warn!(
                            constraint,
                            "unique violation on an idempotency key bypassed ON CONFLICT DO NOTHING"
                        );
                        return AppError::internal(
                            "Duplicate idempotency key",
                            json!({ "constraint": constraint }),
                        );
                    }
                    _ => {
                        tracing::warn!(constraint, "unknown unique constraint violated");
                        return AppError::internal(
                            "Resource already exists",
                            json!({ "constraint": constraint }),
                        );
                    }
                }
            }

            if db_err.is_foreign_key_violation() {
                metrics::counter!("database_errors_total", "type" => "foreign_key_violation")
                    .increment(1);
                let constraint = db_err.constraint().unwrap_or("unknown");
                tracing::warn!(constraint, "foreign key constraint violated");
                return AppError::validation("INVALID_REFERENCE", "Referenced resource not found");
            }

            if db_err.is_check_violation() {
                metrics::counter!("database_errors_total", "type" => "check_violation")
                    .increment(1);
                let constraint = db_err.constraint().unwrap_or("unknown");
                tracing::warn!(constraint, "check constraint violated");
                return AppError::validation("INVALID_INPUT", "Data validation failed");
            }

            tracing::error!(
                code = ?db_err.code(),
                message = ?db_err.message(),
                constraint = ?db_err.constraint(),
                "unhandled database error"
            );
            metrics::counter!("database_errors_total", "type" => "other").increment(1);
            AppError::internal(
                "Database constraint violation",
                json!({ "code": db_err.code() }),
            )
        }

        SqlxError::RowNotFound => {
            metrics::counter!("database_errors_total", "type" => "row_not_found").increment(1);
            AppError::not_found("Record not found")
        }

        SqlxError::PoolTimedOut => {
            tracing::warn!("database connection pool timed out");
            metrics::counter!("database_errors_total", "type" => "pool_timeout").increment(1);
            AppError::internal(
                "Service temporarily unavailable",
                json!({ "retryable": true, "type": "pool_timeout" }),
            )
        }

        SqlxError::PoolClosed => {
            tracing::error!("database connection pool is closed");
            metrics::counter!("database_errors_total", "type" => "pool_closed").increment(1);
            AppError::internal(
                "Service unavailable",
                json!({ "retryable": false, "type": "pool_closed" }),
            )
        }

        SqlxError::Io(_) => {
            tracing::warn!(error = ?e, "database I/O error");
            metrics::counter!("database_errors_total", "type" => "io_error").increment(1);
            AppError::internal(
                "Database connection issue",
                json!({ "retryable": true, "type": "io_error" }),
            )
        }

        SqlxError::Protocol(_) => {
            tracing::error!(error = ?e, "database protocol error");
            metrics::counter!("database_errors_total", "type" => "protocol_error").increment(1);
            AppError::internal(
                "Database protocol error",
                json!({ "retryable": false, "type": "protocol_error" }),
            )
        }

        _ => {
            tracing::error!(error = ?e, "unexpected database error");
            metrics::counter!("database_errors_total", "type" => "unknown").increment(1);
            AppError::internal("Database operation failed", json!({}))
        }
    }
}

impl std::error::Error for AppError {}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let info = self.to_error_info();
        write!(f, "{}: {}", info.code, info.message)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let first = errors
            .field_errors()
            .iter()
            .next()
            .map(|(field, errs)| {
                let reason = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "invalid value".to_string());
                format!("{field}: {reason}")
            })
            .unwrap_or_else(|| "request validation failed".to_string());
        AppError::validation("INVALID_INPUT", first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn validation_is_400() {
        assert_eq!(status(AppError::invalid_destination("bad url")), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn expires_in_past_is_422() {
        assert_eq!(status(AppError::ExpiresInPast), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn link_not_found_is_404() {
        assert_eq!(status(AppError::LinkNotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn link_expired_is_410() {
        assert_eq!(status(AppError::LinkExpired), StatusCode::GONE);
    }

    #[test]
    fn alias_taken_is_409() {
        assert_eq!(status(AppError::AliasTaken), StatusCode::CONFLICT);
    }

    #[test]
    fn unauthorized_is_401_with_www_authenticate() {
        let response = AppError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn forbidden_is_403() {
        assert_eq!(status(AppError::forbidden("nope")), StatusCode::FORBIDDEN);
    }

    #[test]
    fn rate_limited_is_429_with_retry_after() {
        let response = AppError::RateLimited { retry_after_secs: 7 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "7");
    }

    #[test]
    fn not_found_is_404() {
        assert_eq!(status(AppError::not_found("gone")), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_is_500() {
        assert_eq!(status(AppError::internal("oops", json!({}))), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn codes_match_spec_strings() {
        assert_eq!(AppError::LinkNotFound.to_error_info().code, "LINK_NOT_FOUND");
        assert_eq!(AppError::LinkExpired.to_error_info().code, "LINK_EXPIRED");
        assert_eq!(AppError::AliasTaken.to_error_info().code, "ALIAS_TAKEN");
        assert_eq!(AppError::ExpiresInPast.to_error_info().code, "EXPIRES_IN_PAST");
        assert_eq!(AppError::Unauthorized.to_error_info().code, "UNAUTHORIZED");
        assert_eq!(AppError::forbidden("x").to_error_info().code, "FORBIDDEN");
        assert_eq!(AppError::RateLimited { retry_after_secs: 1 }.to_error_info().code, "RATE_LIMITED");
        assert_eq!(AppError::not_found("x").to_error_info().code, "NOT_FOUND");
        assert_eq!(AppError::internal("x", json!({})).to_error_info().code, "INTERNAL_ERROR");
    }

    #[test]
    fn unauthorized_message_is_constant_across_causes() {
        assert_eq!(AppError::Unauthorized.to_error_info().message, UNAUTHORIZED_MESSAGE);
    }

    #[tokio::test]
    async fn flat_response_body_is_unnested() {
        let response = AppError::LinkExpired.into_flat_response();
        assert_eq!(response.status(), StatusCode::GONE);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Link has expired");
        assert_eq!(body["code"], "LINK_EXPIRED");
        assert!(body.get("message").is_none());
    }
}
