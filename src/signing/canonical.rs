//! Request canonicalization and HMAC primitives.
//!
//! Signer and verifier must produce byte-identical canonical strings
//! regardless of transport, so everything here is deterministic: sorted
//! query params, a fixed header allow-list, explicit joining rules.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384, Sha512};
use sha3::Sha3_256;

use crate::config::schema::DigestAlgorithm;
use crate::signing::SignatureError;

/// Headers that participate in the signature, lowercased. Headers absent
/// from the request are omitted, not zero-filled.
pub const SIGNED_HEADERS: [&str; 5] = [
    "content-type",
    "content-length",
    "host",
    "x-api-version",
    "x-client-id",
];

/// Build the canonical string for a request.
///
/// Seven parts joined by `\n`:
/// method, path, sorted query, sorted allow-listed headers, timestamp,
/// nonce, body digest (empty when there is no body).
pub fn canonical_request(
    method: &str,
    path: &str,
    query: &[(String, String)],
    headers: &[(String, String)],
    timestamp: i64,
    nonce: &str,
    body: Option<&[u8]>,
) -> String {
    let mut sorted_query: Vec<&(String, String)> = query.iter().collect();
    sorted_query.sort();
    let query_part = sorted_query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut signed_headers: Vec<String> = headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.to_ascii_lowercase();
            SIGNED_HEADERS
                .contains(&name.as_str())
                .then(|| format!("{name}:{value}"))
        })
        .collect();
    signed_headers.sort();
    let header_part = signed_headers.join("\n");

    let body_part = body
        .map(|b| BASE64.encode(Sha256::digest(b)))
        .unwrap_or_default();

    [
        method.to_ascii_uppercase(),
        path.to_string(),
        query_part,
        header_part,
        timestamp.to_string(),
        nonce.to_string(),
        body_part,
    ]
    .join("\n")
}

/// HMAC the canonical string with the selected digest family.
pub fn hmac_sign(
    digest: DigestAlgorithm,
    secret: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    match digest {
        DigestAlgorithm::Sha256 => {
            let mut mac =
                Hmac::<Sha256>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        DigestAlgorithm::Sha384 => {
            let mut mac =
                Hmac::<Sha384>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        DigestAlgorithm::Sha512 => {
            let mut mac =
                Hmac::<Sha512>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        DigestAlgorithm::Sha3_256 => {
            let mut mac =
                Hmac::<Sha3_256>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}
