//! Time-limited signed URLs.
//!
//! Fully stateless: the expiry rides in the query string and the HMAC
//! covers path + sorted params, so verification needs no server-side
//! storage. Preferable to a temporary-token table for short-lived public
//! links.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use url::form_urlencoded;

use crate::clock::Clock;
use crate::config::schema::DigestAlgorithm;
use crate::signing::canonical::hmac_sign;
use crate::signing::SignatureError;

const SIGNATURE_PARAM: &str = "signature";
const EXPIRES_PARAM: &str = "expires";

/// Generates and verifies signed URLs.
pub struct SignedUrlBuilder {
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl SignedUrlBuilder {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: secret.to_vec(),
            clock,
        }
    }

    /// Build a signed path + query that stays valid for `expires_in`
    /// seconds.
    pub fn generate(
        &self,
        base_path: &str,
        params: &[(String, String)],
        expires_in: u64,
    ) -> Result<String, SignatureError> {
        let expires_at = self.clock.now() as i64 + expires_in as i64;

        let mut all: Vec<(String, String)> = params.to_vec();
        all.push((EXPIRES_PARAM.to_string(), expires_at.to_string()));
        all.sort();

        let signature = self.compute(base_path, &all)?;

        let mut query = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &all {
            query.append_pair(k, v);
        }
        query.append_pair(SIGNATURE_PARAM, &signature);

        Ok(format!("{base_path}?{}", query.finish()))
    }

    /// Verify a signed path + query produced by [`generate`].
    ///
    /// [`generate`]: SignedUrlBuilder::generate
    pub fn verify(&self, path_and_query: &str) -> Result<(), SignatureError> {
        let (path, query) = path_and_query
            .split_once('?')
            .ok_or(SignatureError::MalformedUrl)?;

        let mut params: Vec<(String, String)> = Vec::new();
        let mut presented = None;
        for (k, v) in form_urlencoded::parse(query.as_bytes()) {
            if k == SIGNATURE_PARAM {
                presented = Some(v.into_owned());
            } else {
                params.push((k.into_owned(), v.into_owned()));
            }
        }
        let presented =
            presented.ok_or_else(|| SignatureError::MissingHeader(SIGNATURE_PARAM.to_string()))?;

        let expires_at: i64 = params
            .iter()
            .find(|(k, _)| k == EXPIRES_PARAM)
            .ok_or(SignatureError::MalformedUrl)?
            .1
            .parse()
            .map_err(|_| SignatureError::MalformedUrl)?;
        if expires_at < self.clock.now() as i64 {
            return Err(SignatureError::Expired);
        }

        params.sort();
        let expected = self.compute(path, &params)?;

        if expected.as_bytes().ct_eq(presented.as_bytes()).unwrap_u8() != 1 {
            return Err(SignatureError::Mismatch);
        }
        Ok(())
    }

    /// Canonical string: path, then one sorted `k=v` line per param.
    fn compute(&self, path: &str, sorted_params: &[(String, String)]) -> Result<String, SignatureError> {
        let mut canonical = String::from(path);
        canonical.push('\n');
        canonical.push_str(
            &sorted_params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        let mac = hmac_sign(DigestAlgorithm::Sha256, &self.secret, canonical.as_bytes())?;
        Ok(hex::encode(mac))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn builder(clock: Arc<ManualClock>) -> SignedUrlBuilder {
        SignedUrlBuilder::new(b"url-secret", clock)
    }

    fn params(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_generate_verify_round_trip() {
        let clock = Arc::new(ManualClock::new(1_000.0));
        let b = builder(clock);
        let url = b
            .generate("/downloads/report.pdf", &params(&[("a", "1")]), 3600)
            .unwrap();
        assert!(b.verify(&url).is_ok());
    }

    #[test]
    fn test_expiry_invalidates() {
        let clock = Arc::new(ManualClock::new(1_000.0));
        let b = builder(clock.clone());
        let url = b
            .generate("/downloads/report.pdf", &params(&[("a", "1")]), 3600)
            .unwrap();
        clock.advance(3601.0);
        assert_eq!(b.verify(&url), Err(SignatureError::Expired));
    }

    #[test]
    fn test_tampered_param_invalidates() {
        let clock = Arc::new(ManualClock::new(1_000.0));
        let b = builder(clock);
        let url = b
            .generate("/files", &params(&[("user", "alice")]), 3600)
            .unwrap();
        let tampered = url.replace("alice", "mallory");
        assert_eq!(b.verify(&tampered), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_extending_expiry_invalidates() {
        let clock = Arc::new(ManualClock::new(1_000.0));
        let b = builder(clock);
        let url = b.generate("/files", &[], 60).unwrap();
        // 1060 → 9999: attacker tries to stretch the lifetime
        let tampered = url.replace("1060", "9999");
        assert_eq!(b.verify(&tampered), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_missing_signature_rejected() {
        let clock = Arc::new(ManualClock::new(1_000.0));
        let b = builder(clock);
        assert!(b.verify("/files?expires=2000").is_err());
    }
}
