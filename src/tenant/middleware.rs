//! Tenant resolution middleware.
//!
//! Resolves once per request, attaches the context to request
//! extensions for downstream handlers, and mirrors tenant identity onto
//! response headers for observability.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use url::form_urlencoded;

use crate::config::schema::GatewayConfig;
use crate::error::GatewayError;
use crate::tenant::chain::ResolutionChain;
use crate::tenant::context::TenantContext;
use crate::tenant::resolvers::RequestInfo;

/// State for the tenant resolution middleware.
#[derive(Clone)]
pub struct TenantState {
    pub chain: Arc<ResolutionChain>,
    pub config: Arc<ArcSwap<GatewayConfig>>,
    /// Port this listener accepted the connection on, for the port-map
    /// resolver.
    pub local_port: Option<u16>,
}

pub async fn tenant_middleware(
    State(state): State<TenantState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.load_full();

    let info = request_info(&request, state.local_port);
    match state.chain.resolve(&info) {
        Some(context) => {
            let headers = tenant_headers(&context);
            request.extensions_mut().insert(context);
            let mut response = next.run(request).await;
            for (name, value) in headers {
                if let Ok(v) = HeaderValue::from_str(&value) {
                    response.headers_mut().insert(name, v);
                }
            }
            response
        }
        None if config.tenant.required => {
            tracing::warn!(path = %request.uri().path(), "no tenant resolved on required route");
            GatewayError::TenantRequired.into_response()
        }
        None => next.run(request).await,
    }
}

fn request_info(request: &Request<Body>, local_port: Option<u16>) -> RequestInfo {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };

    let tenant_query = request.uri().query().and_then(|q| {
        form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == "tenant")
            .map(|(_, v)| v.into_owned())
    });

    RequestInfo {
        host: header("host"),
        tenant_id_header: header("x-tenant-id"),
        tenant_code_header: header("x-tenant-code"),
        tenant_query,
        local_port,
    }
}

fn tenant_headers(context: &TenantContext) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        ("x-tenant-id", context.tenant_id.clone()),
        ("x-tenant-code", context.tenant_code.clone()),
    ];
    if let Some(template_id) = &context.template_id {
        headers.push(("x-template-id", template_id.clone()));
    }
    headers
}
