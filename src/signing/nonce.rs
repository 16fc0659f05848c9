//! Nonce tracking for replay protection.
//!
//! A nonce is accepted exactly once, then rejected until its natural
//! expiry, after which the record is garbage-collected.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;

use crate::error::StoreError;

/// Replay-protection seam.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Record a nonce. Returns `true` when the nonce was fresh, `false`
    /// when it was already present (a replay).
    async fn try_insert(&self, nonce: &str, ttl_secs: u64, now: f64) -> Result<bool, StoreError>;

    /// Drop expired nonces. Returns the number removed.
    async fn sweep(&self, now: f64) -> Result<usize, StoreError>;
}

/// Process-local nonce set.
///
/// Only correct for a single-process deployment: two instances with
/// separate sets would each accept the same nonce once. Multi-instance
/// deployments must use [`RedisNonceStore`].
#[derive(Default)]
pub struct MemoryNonceStore {
    seen: DashMap<String, f64>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn try_insert(&self, nonce: &str, ttl_secs: u64, now: f64) -> Result<bool, StoreError> {
        let expires_at = now + ttl_secs as f64;
        match self.seen.entry(nonce.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if *entry.get() <= now {
                    // expired record; the nonce may be used again
                    entry.insert(expires_at);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn sweep(&self, now: f64) -> Result<usize, StoreError> {
        let before = self.seen.len();
        self.seen.retain(|_, expires_at| *expires_at > now);
        Ok(before - self.seen.len())
    }
}

/// Shared nonce set over Redis. `SET NX EX` makes the insert atomic
/// across instances and expiry automatic.
pub struct RedisNonceStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisNonceStore {
    pub fn new(conn: ConnectionManager, prefix: &str) -> Self {
        Self {
            conn,
            prefix: prefix.to_string(),
        }
    }
}

#[async_trait]
impl NonceStore for RedisNonceStore {
    async fn try_insert(&self, nonce: &str, ttl_secs: u64, _now: f64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let key = format!("{}nonce:{}", self.prefix, nonce);
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn sweep(&self, _now: f64) -> Result<usize, StoreError> {
        // TTLs already expire nonce keys
        Ok(0)
    }
}
