//! Rejection taxonomy and HTTP mapping.
//!
//! # Design Decisions
//! - Every rejection carries a machine-readable code; internals (secrets,
//!   full signatures, raw peer addresses) never reach the response body
//! - Retryable rejections (429) advertise when to come back
//! - Store outages surface as 503, never as a silent allow

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Terminal rejection surfaced to the client by the middleware stack.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Per-resource request budget exhausted; retryable.
    #[error("rate limit exceeded for {resource}")]
    RateLimitExceeded {
        resource: String,
        retry_after: f64,
        limit: u32,
        reset: i64,
    },

    /// Client is serving a temporary ban; retryable after expiry.
    #[error("client banned for {retry_after:.0}s")]
    Banned { retry_after: f64 },

    /// A required signature header was absent.
    #[error("missing signature header: {0}")]
    SignatureMissing(String),

    /// Recomputed signature did not match the presented one.
    #[error("signature mismatch")]
    SignatureInvalid,

    /// Signature version prefix not recognized by this deployment.
    #[error("unsupported signature version: {0}")]
    SignatureVersionUnsupported(String),

    /// Signature timestamp malformed or outside the acceptance window.
    #[error("signature timestamp outside allowed window")]
    TimestampOutOfWindow,

    /// Nonce already consumed inside its validity window.
    #[error("nonce replay detected")]
    NonceReplay,

    /// Route requires a tenant but no resolver produced one.
    #[error("tenant resolution required")]
    TenantRequired,

    /// Shared state backend unreachable and policy forbids degrading.
    #[error("state backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl GatewayError {
    /// Stable machine-readable code for response bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::Banned { .. } => "banned",
            Self::SignatureMissing(_) => "signature_missing",
            Self::SignatureInvalid => "signature_invalid",
            Self::SignatureVersionUnsupported(_) => "signature_version_unsupported",
            Self::TimestampOutOfWindow => "timestamp_out_of_window",
            Self::NonceReplay => "nonce_replay",
            Self::TenantRequired => "tenant_required",
            Self::BackendUnavailable(_) => "backend_unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimitExceeded { .. } | Self::Banned { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::SignatureMissing(_)
            | Self::SignatureInvalid
            | Self::SignatureVersionUnsupported(_)
            | Self::TimestampOutOfWindow
            | Self::NonceReplay => StatusCode::UNAUTHORIZED,
            Self::TenantRequired => StatusCode::BAD_REQUEST,
            Self::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.code() });

        let mut response = match &self {
            GatewayError::RateLimitExceeded {
                retry_after,
                limit,
                reset,
                ..
            } => {
                let retry_secs = retry_after.ceil().max(1.0) as u64;
                body["retry_after"] = json!(retry_secs);
                let mut resp = (self.status(), Json(body)).into_response();
                let headers = resp.headers_mut();
                insert_numeric(headers, "retry-after", retry_secs);
                insert_numeric(headers, "x-ratelimit-limit", *limit as u64);
                insert_numeric(headers, "x-ratelimit-remaining", 0);
                insert_numeric(headers, "x-ratelimit-reset", *reset as u64);
                resp
            }
            GatewayError::Banned { retry_after } => {
                let retry_secs = retry_after.ceil().max(1.0) as u64;
                body["retry_after"] = json!(retry_secs);
                let mut resp = (self.status(), Json(body)).into_response();
                insert_numeric(resp.headers_mut(), "retry-after", retry_secs);
                resp
            }
            _ => (self.status(), Json(body)).into_response(),
        };

        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

fn insert_numeric(headers: &mut axum::http::HeaderMap, name: &'static str, value: u64) {
    if let Ok(v) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, v);
    }
}

/// Failure talking to a counter/nonce backend (local stores never fail).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(String),

    #[error("backend protocol error: {0}")]
    Protocol(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Redis(e.to_string())
    }
}
