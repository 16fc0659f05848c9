//! Counter store seam and the in-memory backend.
//!
//! The store owns every piece of shared mutable rate-limit state:
//! per-(client, resource) counters and per-client violation/ban records.
//! Algorithm logic never touches a concrete backend; swapping the
//! in-memory store for the Redis one changes nothing above this seam.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::config::schema::ResourcePolicy;
use crate::error::StoreError;
use crate::ratelimit::algorithms::{apply, CounterState, Decision};

/// Per-client violation and ban record.
#[derive(Debug, Clone, Default)]
pub struct ViolationRecord {
    pub violation_count: u32,
    pub banned_until: Option<f64>,
    pub last_violation: f64,
}

/// Violation records with no active ban are dropped after this much
/// inactivity.
const VIOLATION_TTL_SECS: f64 = 3600.0;

/// Shared mutable state behind the rate limiter.
///
/// `apply` is one atomic read-modify-write per request; implementations
/// must stay correct under concurrent callers hitting the same key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Charge one request against `key` under `policy`.
    async fn apply(
        &self,
        key: &str,
        policy: &ResourcePolicy,
        burst_multiplier: f64,
        now: f64,
    ) -> Result<Decision, StoreError>;

    /// Increment the client's violation counter, returning the new count.
    async fn record_violation(&self, client: &str, now: f64) -> Result<u32, StoreError>;

    /// Set a ban that expires at `until`.
    async fn set_ban(&self, client: &str, until: f64, now: f64) -> Result<(), StoreError>;

    /// Remaining ban expiry for the client, if any. An expired ban is
    /// cleared here, together with the violation count.
    async fn active_ban(&self, client: &str, now: f64) -> Result<Option<f64>, StoreError>;

    /// Drop counters idle past their TTL and expired bans. Returns the
    /// number of entries removed.
    async fn sweep_expired(&self, now: f64) -> Result<usize, StoreError>;
}

struct CounterEntry {
    state: CounterState,
    /// Entries are evicted after `2 * window` without traffic.
    expires_at: f64,
}

/// Process-local store over sharded maps. Correct for a single-instance
/// deployment; multi-instance deployments want the Redis store.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, CounterEntry>,
    violations: DashMap<String, ViolationRecord>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn counter_len(&self) -> usize {
        self.counters.len()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn apply(
        &self,
        key: &str,
        policy: &ResourcePolicy,
        burst_multiplier: f64,
        now: f64,
    ) -> Result<Decision, StoreError> {
        let ttl = 2.0 * policy.window_secs as f64;

        // the entry lock makes the read-modify-write atomic per key
        let mut entry = self.counters.entry(key.to_string()).or_insert_with(|| CounterEntry {
            state: CounterState::SlidingWindow { timestamps: Vec::new() },
            expires_at: now + ttl,
        });

        let previous = if entry.expires_at <= now {
            // idle past TTL; superseded by a fresh counter
            None
        } else {
            Some(entry.state.clone())
        };

        let (next, decision) = apply(previous, policy, burst_multiplier, now);
        entry.state = next;
        entry.expires_at = now + ttl;
        Ok(decision)
    }

    async fn record_violation(&self, client: &str, now: f64) -> Result<u32, StoreError> {
        let mut record = self.violations.entry(client.to_string()).or_default();
        record.violation_count += 1;
        record.last_violation = now;
        Ok(record.violation_count)
    }

    async fn set_ban(&self, client: &str, until: f64, _now: f64) -> Result<(), StoreError> {
        let mut record = self.violations.entry(client.to_string()).or_default();
        record.banned_until = Some(until);
        Ok(())
    }

    async fn active_ban(&self, client: &str, now: f64) -> Result<Option<f64>, StoreError> {
        if let Some(mut record) = self.violations.get_mut(client) {
            match record.banned_until {
                Some(until) if until > now => return Ok(Some(until)),
                Some(_) => {
                    // ban served; violations start over
                    record.banned_until = None;
                    record.violation_count = 0;
                }
                None => {}
            }
        }
        Ok(None)
    }

    async fn sweep_expired(&self, now: f64) -> Result<usize, StoreError> {
        let before = self.counters.len() + self.violations.len();
        self.counters.retain(|_, entry| entry.expires_at > now);
        self.violations.retain(|_, record| {
            record.banned_until.is_some_and(|u| u > now)
                || record.last_violation > now - VIOLATION_TTL_SECS
        });
        Ok(before - (self.counters.len() + self.violations.len()))
    }
}
