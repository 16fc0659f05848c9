//! Signature verification middleware.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use url::form_urlencoded;

use crate::clock::Clock;
use crate::config::schema::GatewayConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::signing::nonce::NonceStore;
use crate::signing::request::{RequestSigner, SignedRequest};
use crate::signing::SignatureError;

/// Largest body the verifier will buffer.
const MAX_SIGNED_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Secret lookup seam. The surrounding application owns key storage;
/// this core only asks for the secret behind a key id.
pub trait SecretKeys: Send + Sync {
    fn secret_for(&self, key_id: &str) -> Option<Vec<u8>>;
}

/// Secrets straight from the config's `signing.keys` table.
pub struct ConfigSecretKeys {
    config: Arc<ArcSwap<GatewayConfig>>,
}

impl ConfigSecretKeys {
    pub fn new(config: Arc<ArcSwap<GatewayConfig>>) -> Self {
        Self { config }
    }
}

impl SecretKeys for ConfigSecretKeys {
    fn secret_for(&self, key_id: &str) -> Option<Vec<u8>> {
        self.config
            .load()
            .signing
            .keys
            .get(key_id)
            .map(|s| s.as_bytes().to_vec())
    }
}

/// State for the signature verification middleware.
#[derive(Clone)]
pub struct SigningState {
    pub config: Arc<ArcSwap<GatewayConfig>>,
    pub secrets: Arc<dyn SecretKeys>,
    pub nonces: Arc<dyn NonceStore>,
    pub clock: Arc<dyn Clock>,
}

pub async fn signature_middleware(
    State(state): State<SigningState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.load_full();
    if !config.signing.required {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    match verify_request(&state, &config, request).await {
        Ok(request) => next.run(request).await,
        Err(e) => {
            // path and reason only; secrets and signatures stay out of
            // the logs
            tracing::warn!(path = %path, reason = %e, "signature verification failed");
            metrics::record_signature_failure(failure_label(&e));
            GatewayError::from(e).into_response()
        }
    }
}

async fn verify_request(
    state: &SigningState,
    config: &GatewayConfig,
    request: Request<Body>,
) -> Result<Request<Body>, SignatureError> {
    let names = &config.signing.headers;

    let signature = required_header(&request, &names.signature)?;
    let timestamp_raw = required_header(&request, &names.timestamp)?;
    let nonce = required_header(&request, &names.nonce)?;
    let key_id = required_header(&request, &names.key_id)?;

    let timestamp: i64 = timestamp_raw
        .parse()
        .map_err(|_| SignatureError::MalformedTimestamp)?;

    let secret = state
        .secrets
        .secret_for(&key_id)
        .ok_or(SignatureError::UnknownKeyId)?;

    let (parts, body) = request.into_parts();

    let query: Vec<(String, String)> = parts
        .uri
        .query()
        .map(|q| {
            form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body_bytes: Bytes = axum::body::to_bytes(body, MAX_SIGNED_BODY_BYTES)
        .await
        .map_err(|_| SignatureError::Mismatch)?;

    let signer = RequestSigner::new(
        config.signing.digest,
        config.signing.time_window_secs,
        state.clock.clone(),
    );

    let signed = SignedRequest {
        method: parts.method.as_str(),
        path: parts.uri.path(),
        query: &query,
        headers: &headers,
        body: (!body_bytes.is_empty()).then_some(body_bytes.as_ref()),
        signature: &signature,
        timestamp,
        nonce: &nonce,
    };

    let nonces = config.signing.check_replay.then_some(state.nonces.as_ref());
    signer.verify(&signed, &secret, nonces).await?;

    Ok(Request::from_parts(parts, Body::from(body_bytes)))
}

fn required_header(request: &Request<Body>, name: &str) -> Result<String, SignatureError> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .ok_or_else(|| SignatureError::MissingHeader(name.to_string()))
}

fn failure_label(e: &SignatureError) -> &'static str {
    match e {
        SignatureError::MissingHeader(_) => "missing_header",
        SignatureError::UnsupportedVersion(_) => "unsupported_version",
        SignatureError::MalformedTimestamp | SignatureError::TimestampOutOfWindow => "timestamp",
        SignatureError::NonceReplay => "replay",
        SignatureError::Backend(_) => "backend",
        _ => "mismatch",
    }
}
