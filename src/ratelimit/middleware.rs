//! Rate limiting middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::schema::GatewayConfig;
use crate::error::GatewayError;
use crate::identity::ClientIdentity;
use crate::observability::metrics;
use crate::ratelimit::limiter::{DecisionKind, RateLimiter};

/// State for the rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<ArcSwap<GatewayConfig>>,
}

/// Derive the client fingerprint from the request.
///
/// A signed `x-client-id` header identifies an authenticated caller; the
/// signature middleware later rejects the request if that header was
/// forged, which also invalidates any budget it was charged against.
pub fn client_identity(addr: SocketAddr, request: &Request<Body>) -> ClientIdentity {
    let client_id = request
        .headers()
        .get("x-client-id")
        .and_then(|v| v.to_str().ok());
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok());
    ClientIdentity::from_parts(client_id, addr.ip(), user_agent)
}

pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.load_full();
    let settings = &config.rate_limit;

    let client = client_identity(addr, &request);
    let resource = settings.resource_for_path(request.uri().path()).to_string();

    let decision = match state.limiter.check(&client, &resource, settings).await {
        Ok(d) => d,
        Err(e) => {
            // only reachable when there is no degrade path left
            return GatewayError::BackendUnavailable(e.to_string()).into_response();
        }
    };

    match decision.kind {
        DecisionKind::Allowed | DecisionKind::Bypassed => {
            metrics::record_allowed(&resource);
            let mut response = next.run(request).await;
            if decision.kind == DecisionKind::Allowed {
                let headers = response.headers_mut();
                insert_numeric(headers, "x-ratelimit-limit", decision.limit as u64);
                insert_numeric(headers, "x-ratelimit-remaining", decision.remaining as u64);
                insert_numeric(headers, "x-ratelimit-reset", decision.reset as u64);
            }
            response
        }
        DecisionKind::Limited => {
            // the caller-side of the contract: one violation per deny
            if let Err(e) = state.limiter.record_violation(&client).await {
                tracing::warn!(client = %client, error = %e, "failed to record violation");
            }
            tracing::warn!(
                client = %client,
                resource = %resource,
                retry_after = decision.retry_after,
                "rate limit exceeded"
            );
            metrics::record_rate_limited(&resource);
            GatewayError::RateLimitExceeded {
                resource,
                retry_after: decision.retry_after,
                limit: decision.limit,
                reset: decision.reset as i64,
            }
            .into_response()
        }
        DecisionKind::Banned => {
            if let Err(e) = state.limiter.record_violation(&client).await {
                tracing::warn!(client = %client, error = %e, "failed to record violation");
            }
            tracing::warn!(
                client = %client,
                retry_after = decision.retry_after,
                "banned client rejected"
            );
            metrics::record_banned();
            GatewayError::Banned {
                retry_after: decision.retry_after,
            }
            .into_response()
        }
    }
}

fn insert_numeric(headers: &mut axum::http::HeaderMap, name: &'static str, value: u64) {
    if let Ok(v) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(name, v);
    }
}
