//! Versioned request signing and verification.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::clock::Clock;
use crate::config::schema::DigestAlgorithm;
use crate::signing::canonical::{canonical_request, hmac_sign};
use crate::signing::nonce::NonceStore;
use crate::signing::SignatureError;

/// Current signature format version.
pub const SIGNATURE_VERSION: &str = "v1";

/// Output of signing a request: everything the client puts on the wire.
#[derive(Debug, Clone)]
pub struct SignatureParts {
    /// `"v1:<base64 hmac>"`.
    pub signature: String,
    pub timestamp: i64,
    pub nonce: String,
}

/// The signable fields of an inbound request plus the presented
/// signature material. Ephemeral; only the nonce outlives verification.
#[derive(Debug)]
pub struct SignedRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub headers: &'a [(String, String)],
    pub body: Option<&'a [u8]>,
    pub signature: &'a str,
    pub timestamp: i64,
    pub nonce: &'a str,
}

/// Signs and verifies canonical requests.
pub struct RequestSigner {
    digest: DigestAlgorithm,
    /// Accepted clock skew in seconds, boundary inclusive.
    time_window: i64,
    clock: Arc<dyn Clock>,
}

impl RequestSigner {
    pub fn new(digest: DigestAlgorithm, time_window: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            digest,
            time_window,
            clock,
        }
    }

    /// Sign a request, generating timestamp and nonce when not supplied.
    #[allow(clippy::too_many_arguments)]
    pub fn sign(
        &self,
        secret: &[u8],
        method: &str,
        path: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
        body: Option<&[u8]>,
        timestamp: Option<i64>,
        nonce: Option<String>,
    ) -> Result<SignatureParts, SignatureError> {
        let timestamp = timestamp.unwrap_or_else(|| self.clock.now() as i64);
        let nonce = nonce.unwrap_or_else(|| derive_nonce(timestamp, secret, method, path));

        let canonical = canonical_request(method, path, query, headers, timestamp, &nonce, body);
        let mac = hmac_sign(self.digest, secret, canonical.as_bytes())?;

        Ok(SignatureParts {
            signature: format!("{SIGNATURE_VERSION}:{}", BASE64.encode(mac)),
            timestamp,
            nonce,
        })
    }

    /// Verify a signed request.
    ///
    /// Pass a nonce store to enforce replay protection; `None` skips the
    /// replay check (the nonce is then only part of the signed material).
    pub async fn verify(
        &self,
        request: &SignedRequest<'_>,
        secret: &[u8],
        nonces: Option<&dyn NonceStore>,
    ) -> Result<(), SignatureError> {
        let encoded = match request.signature.split_once(':') {
            Some((SIGNATURE_VERSION, rest)) => rest,
            Some((version, _)) => {
                return Err(SignatureError::UnsupportedVersion(version.to_string()))
            }
            None => return Err(SignatureError::UnsupportedVersion("(none)".to_string())),
        };

        let now = self.clock.now() as i64;
        if (now - request.timestamp).abs() > self.time_window {
            return Err(SignatureError::TimestampOutOfWindow);
        }

        let canonical = canonical_request(
            request.method,
            request.path,
            request.query,
            request.headers,
            request.timestamp,
            request.nonce,
            request.body,
        );
        let expected = hmac_sign(self.digest, secret, canonical.as_bytes())?;
        let presented = BASE64
            .decode(encoded)
            .map_err(|_| SignatureError::Mismatch)?;

        if expected.ct_eq(&presented).unwrap_u8() != 1 {
            return Err(SignatureError::Mismatch);
        }

        // nonce is consumed only after the signature proves authentic,
        // so strangers cannot poison the replay set
        if let Some(store) = nonces {
            let ttl = (self.time_window * 2).max(1) as u64;
            let fresh = store
                .try_insert(request.nonce, ttl, self.clock.now())
                .await
                .map_err(|e| SignatureError::Backend(e.to_string()))?;
            if !fresh {
                return Err(SignatureError::NonceReplay);
            }
        }

        Ok(())
    }
}

/// Derive a nonce from the signing inputs plus fresh entropy. The hash
/// binds it to the request; the entropy keeps same-second requests to
/// the same path distinct.
fn derive_nonce(timestamp: i64, secret: &[u8], method: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(secret);
    hasher.update(method.as_bytes());
    hasher.update(path.as_bytes());
    hasher.update(fastrand::u64(..).to_le_bytes());
    hex::encode(&hasher.finalize()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::signing::nonce::MemoryNonceStore;

    fn signer(clock: Arc<ManualClock>) -> RequestSigner {
        RequestSigner::new(DigestAlgorithm::Sha256, 300, clock)
    }

    fn headers() -> Vec<(String, String)> {
        vec![
            ("host".to_string(), "api.example.com".to_string()),
            ("content-type".to_string(), "application/json".to_string()),
        ]
    }

    #[tokio::test]
    async fn test_sign_verify_round_trip() {
        let clock = Arc::new(ManualClock::new(1_700_000_000.0));
        let s = signer(clock);
        let h = headers();
        let parts = s
            .sign(b"secret", "POST", "/api/orders", &[], &h, Some(b"{}"), None, None)
            .unwrap();

        let request = SignedRequest {
            method: "POST",
            path: "/api/orders",
            query: &[],
            headers: &h,
            body: Some(b"{}"),
            signature: &parts.signature,
            timestamp: parts.timestamp,
            nonce: &parts.nonce,
        };
        assert!(s.verify(&request, b"secret", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_any_single_change_breaks_signature() {
        let clock = Arc::new(ManualClock::new(1_700_000_000.0));
        let s = signer(clock);
        let h = headers();
        let parts = s
            .sign(b"secret", "POST", "/api/orders", &[], &h, Some(b"{}"), None, None)
            .unwrap();

        let tampered_header = vec![
            ("host".to_string(), "evil.example.com".to_string()),
            ("content-type".to_string(), "application/json".to_string()),
        ];
        let cases: Vec<SignedRequest> = vec![
            SignedRequest {
                method: "POST",
                path: "/api/orderz",
                query: &[],
                headers: &h,
                body: Some(b"{}"),
                signature: &parts.signature,
                timestamp: parts.timestamp,
                nonce: &parts.nonce,
            },
            SignedRequest {
                method: "POST",
                path: "/api/orders",
                query: &[],
                headers: &h,
                body: Some(b"{!"),
                signature: &parts.signature,
                timestamp: parts.timestamp,
                nonce: &parts.nonce,
            },
            SignedRequest {
                method: "POST",
                path: "/api/orders",
                query: &[],
                headers: &tampered_header,
                body: Some(b"{}"),
                signature: &parts.signature,
                timestamp: parts.timestamp,
                nonce: &parts.nonce,
            },
        ];
        for request in &cases {
            assert_eq!(
                s.verify(request, b"secret", None).await,
                Err(SignatureError::Mismatch)
            );
        }
    }

    #[tokio::test]
    async fn test_timestamp_window_boundaries() {
        let clock = Arc::new(ManualClock::new(10_000.0));
        let s = signer(clock.clone());
        let h = headers();

        for (age, ok) in [(299, true), (300, true), (301, false)] {
            let ts = 10_000 - age;
            let parts = s
                .sign(b"secret", "GET", "/x", &[], &h, None, Some(ts), None)
                .unwrap();
            let request = SignedRequest {
                method: "GET",
                path: "/x",
                query: &[],
                headers: &h,
                body: None,
                signature: &parts.signature,
                timestamp: parts.timestamp,
                nonce: &parts.nonce,
            };
            let result = s.verify(&request, b"secret", None).await;
            if ok {
                assert!(result.is_ok(), "age {age}");
            } else {
                assert_eq!(result, Err(SignatureError::TimestampOutOfWindow), "age {age}");
            }
        }
    }

    #[tokio::test]
    async fn test_replay_rejected_second_time() {
        let clock = Arc::new(ManualClock::new(50_000.0));
        let s = signer(clock);
        let h = headers();
        let nonces = MemoryNonceStore::new();
        let parts = s
            .sign(b"secret", "GET", "/x", &[], &h, None, None, None)
            .unwrap();
        let request = SignedRequest {
            method: "GET",
            path: "/x",
            query: &[],
            headers: &h,
            body: None,
            signature: &parts.signature,
            timestamp: parts.timestamp,
            nonce: &parts.nonce,
        };
        assert!(s.verify(&request, b"secret", Some(&nonces)).await.is_ok());
        assert_eq!(
            s.verify(&request, b"secret", Some(&nonces)).await,
            Err(SignatureError::NonceReplay)
        );
    }

    #[tokio::test]
    async fn test_unsupported_version_rejected() {
        let clock = Arc::new(ManualClock::new(1_000.0));
        let s = signer(clock);
        let request = SignedRequest {
            method: "GET",
            path: "/x",
            query: &[],
            headers: &[],
            body: None,
            signature: "v9:AAAA",
            timestamp: 1_000,
            nonce: "n",
        };
        assert_eq!(
            s.verify(&request, b"secret", None).await,
            Err(SignatureError::UnsupportedVersion("v9".to_string()))
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_fails() {
        let clock = Arc::new(ManualClock::new(1_000.0));
        let s = signer(clock);
        let parts = s
            .sign(b"secret", "GET", "/x", &[], &[], None, None, None)
            .unwrap();
        let request = SignedRequest {
            method: "GET",
            path: "/x",
            query: &[],
            headers: &[],
            body: None,
            signature: &parts.signature,
            timestamp: parts.timestamp,
            nonce: &parts.nonce,
        };
        assert_eq!(
            s.verify(&request, b"other", None).await,
            Err(SignatureError::Mismatch)
        );
    }
}
