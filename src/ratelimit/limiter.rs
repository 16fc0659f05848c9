//! Rate limiter core: ban short-circuit, per-resource policies,
//! violation escalation, and backend failure handling.
//!
//! # Design Decisions
//! - The limiter never records violations itself; the caller does so
//!   exactly once after a deny, so nothing double-counts
//! - Disabling is an explicit configuration act, never a fallback
//! - A shared-backend outage degrades to the process-local store for
//!   security-relevant resources instead of failing open

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::schema::{FailurePolicy, RateLimitSettings};
use crate::error::StoreError;
use crate::identity::ClientIdentity;
use crate::ratelimit::store::{CounterStore, MemoryCounterStore};

/// Violation count that triggers the first, short ban.
const BAN_THRESHOLD_SHORT: u32 = 5;
/// Short ban length in seconds.
const BAN_SECS_SHORT: f64 = 300.0;
/// Violation count that escalates to the long ban.
const BAN_THRESHOLD_LONG: u32 = 10;
/// Long ban length in seconds; overwrites the short one.
const BAN_SECS_LONG: f64 = 3600.0;

/// Why a request was allowed or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    /// Counted and within budget.
    Allowed,
    /// Rate limiting disabled or client exempt; nothing was counted.
    Bypassed,
    /// Budget exhausted for the resource.
    Limited,
    /// Client is serving a ban.
    Banned,
}

/// Outcome of a rate-limit check, with everything the middleware needs
/// to render headers.
#[derive(Debug, Clone)]
pub struct RateDecision {
    pub kind: DecisionKind,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until a retry can succeed (deny only).
    pub retry_after: f64,
    /// Unix time the window resets.
    pub reset: f64,
}

impl RateDecision {
    pub fn allowed(&self) -> bool {
        matches!(self.kind, DecisionKind::Allowed | DecisionKind::Bypassed)
    }

    fn bypassed() -> Self {
        Self {
            kind: DecisionKind::Bypassed,
            limit: u32::MAX,
            remaining: u32::MAX,
            retry_after: 0.0,
            reset: 0.0,
        }
    }
}

/// Shared, concurrency-safe rate limiter.
///
/// Constructed once at startup and passed by reference to request
/// handlers; per-call settings come from the current config snapshot so
/// hot reloads apply without rebuilding state.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    /// Process-local fallback when the primary is remote.
    fallback: Option<Arc<MemoryCounterStore>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Limiter over a process-local store.
    pub fn local(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(MemoryCounterStore::new()),
            fallback: None,
            clock,
        }
    }

    /// Limiter over a shared store, with a local store standing by for
    /// the degrade path.
    pub fn distributed(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            fallback: Some(Arc::new(MemoryCounterStore::new())),
            clock,
        }
    }

    /// Check whether `client` may touch `resource` right now.
    ///
    /// Never mutates violation state; call [`RateLimiter::record_violation`]
    /// after acting on a deny.
    pub async fn check(
        &self,
        client: &ClientIdentity,
        resource: &str,
        settings: &RateLimitSettings,
    ) -> Result<RateDecision, StoreError> {
        if !settings.enabled {
            return Ok(RateDecision::bypassed());
        }
        if settings.exempt.iter().any(|e| e == client.as_str()) {
            return Ok(RateDecision::bypassed());
        }

        let now = self.clock.now();
        let policy = settings.policy_for(resource);

        // banned clients never reach the algorithm
        match self.store.active_ban(client.as_str(), now).await {
            Ok(Some(until)) => {
                return Ok(RateDecision {
                    kind: DecisionKind::Banned,
                    limit: policy.max_requests,
                    remaining: 0,
                    retry_after: until - now,
                    reset: until,
                });
            }
            Ok(None) => {}
            Err(e) => {
                // ban state unavailable; the counter path below decides
                // whether this request degrades or opens
                tracing::warn!(client = %client, error = %e, "ban lookup failed");
            }
        }

        let key = format!("{}:{}", client.as_str(), resource);
        let outcome = self
            .store
            .apply(&key, &policy, settings.burst_multiplier, now)
            .await;

        let decision = match outcome {
            Ok(d) => d,
            Err(e) => match policy.failure_policy {
                FailurePolicy::Degrade => {
                    let Some(fallback) = &self.fallback else {
                        return Err(e);
                    };
                    tracing::warn!(
                        client = %client,
                        resource = %resource,
                        error = %e,
                        "shared store unavailable, degrading to local counters"
                    );
                    fallback
                        .apply(&key, &policy, settings.burst_multiplier, now)
                        .await?
                }
                FailurePolicy::Open => {
                    tracing::warn!(
                        client = %client,
                        resource = %resource,
                        error = %e,
                        "shared store unavailable, allowing best-effort resource"
                    );
                    return Ok(RateDecision::bypassed());
                }
            },
        };

        Ok(RateDecision {
            kind: if decision.allowed {
                DecisionKind::Allowed
            } else {
                DecisionKind::Limited
            },
            limit: policy.max_requests,
            remaining: decision.remaining,
            retry_after: decision.retry_after,
            reset: decision.reset,
        })
    }

    /// Record one violation for a client whose request was just denied.
    /// Crossing a threshold sets (or escalates) the ban.
    pub async fn record_violation(&self, client: &ClientIdentity) -> Result<u32, StoreError> {
        let now = self.clock.now();
        let count = self.store.record_violation(client.as_str(), now).await?;

        let ban_secs = if count >= BAN_THRESHOLD_LONG {
            Some(BAN_SECS_LONG)
        } else if count >= BAN_THRESHOLD_SHORT {
            Some(BAN_SECS_SHORT)
        } else {
            None
        };

        if let Some(secs) = ban_secs {
            self.store.set_ban(client.as_str(), now + secs, now).await?;
            tracing::warn!(
                client = %client,
                violations = count,
                ban_secs = secs,
                "client banned after repeated violations"
            );
        }
        Ok(count)
    }

    /// Sweep expired counters and bans; invoked periodically.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut removed = self.store.sweep_expired(now).await?;
        if let Some(fallback) = &self.fallback {
            removed += fallback.sweep_expired(now).await?;
        }
        Ok(removed)
    }
}
