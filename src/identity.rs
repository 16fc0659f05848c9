//! Per-client fingerprint derivation.
//!
//! The fingerprint is the partition key for all rate-limit and ban state.
//! Authenticated callers key on their client id; anonymous callers key on
//! a hash of peer address + user agent. Only the derived key ever appears
//! in logs.

use std::fmt;
use std::net::IpAddr;

use sha2::{Digest, Sha256};

/// Opaque, stable per-client key.
///
/// Recomputed on every request; never persisted as an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Derive the fingerprint from connection and auth info.
    ///
    /// An authenticated client id wins over the connection fingerprint so
    /// a user keeps one budget across addresses.
    pub fn from_parts(client_id: Option<&str>, ip: IpAddr, user_agent: Option<&str>) -> Self {
        match client_id {
            Some(id) if !id.is_empty() => Self(format!("user:{}", short_hash(id.as_bytes()))),
            _ => {
                let mut hasher = Sha256::new();
                hasher.update(ip.to_string().as_bytes());
                hasher.update(b"|");
                hasher.update(user_agent.unwrap_or("").as_bytes());
                let digest = hasher.finalize();
                Self(format!("anon:{}", hex::encode(&digest[..16])))
            }
        }
    }

    /// Wrap an already-derived key (config exempt lists, tests).
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn short_hash(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    hex::encode(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_id_wins() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let a = ClientIdentity::from_parts(Some("client-7"), ip, Some("curl/8"));
        let b = ClientIdentity::from_parts(Some("client-7"), "10.0.0.2".parse().unwrap(), None);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("user:"));
    }

    #[test]
    fn test_anonymous_fingerprint_varies_by_agent() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let a = ClientIdentity::from_parts(None, ip, Some("curl/8"));
        let b = ClientIdentity::from_parts(None, ip, Some("wget/1"));
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("anon:"));
    }

    #[test]
    fn test_raw_ip_never_in_key() {
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        let id = ClientIdentity::from_parts(None, ip, Some("ua"));
        assert!(!id.as_str().contains("203.0.113.9"));
    }
}
