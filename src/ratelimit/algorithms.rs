//! Counting algorithms as pure state transitions.
//!
//! Each algorithm is a function from (previous counter state, now) to
//! (next counter state, decision). Keeping them pure lets the in-memory
//! store run them under its entry lock and the Redis store mirror them in
//! Lua, without the decision logic diverging between backends.
//!
//! Invariants: tokens/level/count never go negative; fixed-window ids only
//! move forward with the wall clock.

use serde::{Deserialize, Serialize};

use crate::config::schema::{Algorithm, ResourcePolicy};

/// Algorithm-specific counter state for one (client, resource) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CounterState {
    TokenBucket { tokens: f64, last_refill: f64 },
    SlidingWindow { timestamps: Vec<f64> },
    FixedWindow { window_id: u64, count: u32 },
    LeakyBucket { level: f64, last_leak: f64 },
}

/// Outcome of charging one request against a counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    /// Requests left in the current window (floor for fractional budgets).
    pub remaining: u32,
    /// Seconds until a retry can succeed; 0 when allowed.
    pub retry_after: f64,
    /// Unix time when the window resets or the next slot frees.
    pub reset: f64,
}

impl Decision {
    fn allow(remaining: u32, reset: f64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: 0.0,
            reset,
        }
    }

    fn deny(retry_after: f64, reset: f64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after,
            reset,
        }
    }
}

/// Charge one request, producing the next state and the decision.
pub fn apply(
    state: Option<CounterState>,
    policy: &ResourcePolicy,
    burst_multiplier: f64,
    now: f64,
) -> (CounterState, Decision) {
    let max = policy.max_requests as f64;
    let window = policy.window_secs as f64;

    match policy.algorithm {
        Algorithm::TokenBucket => {
            let capacity = max * burst_multiplier;
            let (mut tokens, last_refill) = match state {
                Some(CounterState::TokenBucket {
                    tokens,
                    last_refill,
                }) => (tokens, last_refill),
                _ => (capacity, now),
            };

            let elapsed = (now - last_refill).max(0.0);
            tokens = (tokens + elapsed / window * max).min(capacity);

            let decision = if tokens >= 1.0 {
                tokens -= 1.0;
                Decision::allow(tokens.floor() as u32, now + window)
            } else {
                let retry_after = (1.0 - tokens) / max * window;
                Decision::deny(retry_after, now + retry_after)
            };

            (
                CounterState::TokenBucket {
                    tokens,
                    last_refill: now,
                },
                decision,
            )
        }

        Algorithm::SlidingWindow => {
            let mut timestamps = match state {
                Some(CounterState::SlidingWindow { timestamps }) => timestamps,
                _ => Vec::new(),
            };
            // expire before counting
            timestamps.retain(|&t| t > now - window);

            let decision = if (timestamps.len() as u32) < policy.max_requests {
                timestamps.push(now);
                let remaining = policy.max_requests - timestamps.len() as u32;
                let oldest = timestamps.first().copied().unwrap_or(now);
                Decision::allow(remaining, oldest + window)
            } else {
                let oldest = timestamps.first().copied().unwrap_or(now);
                Decision::deny(window - (now - oldest), oldest + window)
            };

            (CounterState::SlidingWindow { timestamps }, decision)
        }

        Algorithm::FixedWindow => {
            let current_id = (now / window).floor() as u64;
            let count = match state {
                Some(CounterState::FixedWindow { window_id, count }) if window_id == current_id => {
                    count
                }
                // new bucket; counter resets
                _ => 0,
            };
            let reset = (current_id + 1) as f64 * window;

            let decision = if count < policy.max_requests {
                Decision::allow(policy.max_requests - count - 1, reset)
            } else {
                Decision::deny(reset - now, reset)
            };
            let count = if decision.allowed { count + 1 } else { count };

            (
                CounterState::FixedWindow {
                    window_id: current_id,
                    count,
                },
                decision,
            )
        }

        Algorithm::LeakyBucket => {
            let (mut level, last_leak) = match state {
                Some(CounterState::LeakyBucket { level, last_leak }) => (level, last_leak),
                _ => (0.0, now),
            };

            let elapsed = (now - last_leak).max(0.0);
            level = (level - elapsed * max / window).max(0.0);

            let decision = if level < max {
                level += 1.0;
                Decision::allow((max - level).floor() as u32, now + level * window / max)
            } else {
                // time until enough drains for one unit
                let retry_after = (level - max + 1.0) * window / max;
                Decision::deny(retry_after, now + retry_after)
            };

            (
                CounterState::LeakyBucket {
                    level,
                    last_leak: now,
                },
                decision,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Algorithm;

    fn policy(max: u32, window: u64, algorithm: Algorithm) -> ResourcePolicy {
        ResourcePolicy::new(max, window, algorithm)
    }

    fn run_n(
        n: usize,
        state: &mut Option<CounterState>,
        policy: &ResourcePolicy,
        now: f64,
    ) -> usize {
        let mut allowed = 0;
        for _ in 0..n {
            let (next, decision) = apply(state.take(), policy, 1.5, now);
            *state = Some(next);
            if decision.allowed {
                allowed += 1;
            }
        }
        allowed
    }

    #[test]
    fn test_sliding_window_exact_cutoff() {
        let p = policy(3, 10, Algorithm::SlidingWindow);
        let mut state = None;
        assert_eq!(run_n(3, &mut state, &p, 100.0), 3);

        let (next, decision) = apply(state, &p, 1.5, 100.0);
        assert!(!decision.allowed);
        // full window must pass before the oldest expires
        assert!((decision.retry_after - 10.0).abs() < 1e-9);

        let (_, decision) = apply(Some(next), &p, 1.5, 110.1);
        assert!(decision.allowed);
    }

    #[test]
    fn test_sliding_window_scenario_from_staggered_requests() {
        // limiter (3, 10): requests at t=0,2,4 allowed; t=5 denied with
        // retry ~5; t=11 allowed again after the t=0 stamp ages out.
        let p = policy(3, 10, Algorithm::SlidingWindow);
        let mut state = None;
        for t in [0.0, 2.0, 4.0] {
            let (next, decision) = apply(state.take(), &p, 1.5, t);
            assert!(decision.allowed, "t={t}");
            state = Some(next);
        }
        let (next, decision) = apply(state.take(), &p, 1.5, 5.0);
        assert!(!decision.allowed);
        assert!((decision.retry_after - 5.0).abs() < 1e-9);

        let (_, decision) = apply(Some(next), &p, 1.5, 11.0);
        assert!(decision.allowed);
    }

    #[test]
    fn test_token_bucket_burst_then_refill() {
        let p = policy(10, 60, Algorithm::TokenBucket);
        let mut state = None;
        // capacity 15 with the 1.5x burst multiplier
        assert_eq!(run_n(20, &mut state, &p, 0.0), 15);

        // 30s refills 5 tokens
        let mut allowed = 0;
        for _ in 0..10 {
            let (next, decision) = apply(state.take(), &p, 1.5, 30.0);
            state = Some(next);
            if decision.allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    #[test]
    fn test_token_bucket_retry_after() {
        let p = policy(10, 60, Algorithm::TokenBucket);
        let mut state = None;
        run_n(15, &mut state, &p, 0.0);
        let (_, decision) = apply(state, &p, 1.5, 0.0);
        assert!(!decision.allowed);
        // one full token at 10 per 60s costs 6s
        assert!(decision.retry_after > 0.0 && decision.retry_after <= 6.0);
    }

    #[test]
    fn test_fixed_window_resets_on_boundary() {
        let p = policy(5, 10, Algorithm::FixedWindow);
        let mut state = None;
        assert_eq!(run_n(7, &mut state, &p, 3.0), 5);

        // next bucket starts at t=10
        let (_, decision) = apply(state, &p, 1.5, 10.0);
        assert!(decision.allowed);
    }

    #[test]
    fn test_fixed_window_boundary_burst_is_allowed() {
        // the documented 2x weakness: a full budget right before the edge
        // and a full budget right after
        let p = policy(5, 10, Algorithm::FixedWindow);
        let mut state = None;
        assert_eq!(run_n(5, &mut state, &p, 9.9), 5);
        assert_eq!(run_n(5, &mut state, &p, 10.0), 5);
    }

    #[test]
    fn test_leaky_bucket_smooths() {
        let p = policy(10, 10, Algorithm::LeakyBucket);
        let mut state = None;
        assert_eq!(run_n(12, &mut state, &p, 0.0), 10);

        // leaks one unit per second
        let (next, decision) = apply(state.take(), &p, 1.5, 1.0);
        assert!(decision.allowed);
        state = Some(next);
        let (_, decision) = apply(state.take(), &p, 1.5, 1.0);
        assert!(!decision.allowed);
        assert!(decision.retry_after > 0.0);
    }

    #[test]
    fn test_levels_never_negative() {
        let p = policy(5, 10, Algorithm::LeakyBucket);
        let (state, _) = apply(None, &p, 1.5, 0.0);
        // long idle drains far past zero
        let (state, _) = apply(Some(state), &p, 1.5, 10_000.0);
        match state {
            CounterState::LeakyBucket { level, .. } => assert!(level >= 0.0),
            _ => panic!("wrong state"),
        }
    }
}
