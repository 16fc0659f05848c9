//! Request, webhook, and URL signing subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound:
//!     canonical.rs (deterministic serialization)
//!     → request.rs sign (versioned HMAC + timestamp + nonce)
//!
//! Inbound:
//!     middleware.rs (extract headers, look up secret by key id)
//!     → request.rs verify (recompute, constant-time compare)
//!     → nonce.rs (replay check)
//!     → pass or 401
//! ```
//!
//! # Design Decisions
//! - One canonicalization routine shared by sign and verify
//! - All comparisons constant-time; no early-exit equality anywhere
//! - Nonce state sits behind the NonceStore seam; the in-memory store is
//!   single-process only and says so

pub mod canonical;
pub mod middleware;
pub mod nonce;
pub mod request;
pub mod url;
pub mod webhook;

use thiserror::Error;

use crate::error::GatewayError;

pub use canonical::{canonical_request, SIGNED_HEADERS};
pub use middleware::{signature_middleware, ConfigSecretKeys, SecretKeys, SigningState};
pub use nonce::{MemoryNonceStore, NonceStore, RedisNonceStore};
pub use request::{RequestSigner, SignatureParts, SignedRequest, SIGNATURE_VERSION};
pub use url::SignedUrlBuilder;
pub use webhook::{WebhookSignature, WebhookSigner};

/// Typed verification failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing header: {0}")]
    MissingHeader(String),

    #[error("unsupported signature version: {0}")]
    UnsupportedVersion(String),

    #[error("malformed timestamp")]
    MalformedTimestamp,

    #[error("timestamp outside acceptance window")]
    TimestampOutOfWindow,

    #[error("nonce already used")]
    NonceReplay,

    #[error("signature mismatch")]
    Mismatch,

    #[error("signed url expired")]
    Expired,

    #[error("malformed signed url")]
    MalformedUrl,

    #[error("invalid signing key")]
    InvalidKey,

    #[error("unknown key id")]
    UnknownKeyId,

    #[error("replay store unavailable: {0}")]
    Backend(String),
}

impl From<SignatureError> for GatewayError {
    fn from(e: SignatureError) -> Self {
        match e {
            SignatureError::MissingHeader(name) => GatewayError::SignatureMissing(name),
            SignatureError::UnsupportedVersion(v) => GatewayError::SignatureVersionUnsupported(v),
            SignatureError::MalformedTimestamp
            | SignatureError::TimestampOutOfWindow
            | SignatureError::Expired => GatewayError::TimestampOutOfWindow,
            SignatureError::NonceReplay => GatewayError::NonceReplay,
            SignatureError::Backend(detail) => GatewayError::BackendUnavailable(detail),
            SignatureError::Mismatch
            | SignatureError::MalformedUrl
            | SignatureError::InvalidKey
            | SignatureError::UnknownKeyId => GatewayError::SignatureInvalid,
        }
    }
}
