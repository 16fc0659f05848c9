//! Rate limiting subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → middleware.rs (derive client key, map path → resource)
//!     → limiter.rs (ban short-circuit, policy lookup)
//!     → store.rs / redis_store.rs (atomic counter update)
//!     → algorithms.rs (pure decision logic)
//!     → allow (with X-RateLimit-* headers) or 429
//! ```
//!
//! # Design Decisions
//! - Counters live behind the CounterStore seam so local and distributed
//!   backends swap without touching algorithm code
//! - Violations are recorded by the caller after a deny, never inside
//!   check, so one deny is one violation
//! - Backend outages degrade per resource policy; security-relevant
//!   resources keep enforcing on local state

pub mod algorithms;
pub mod limiter;
pub mod middleware;
pub mod redis_store;
pub mod store;

pub use algorithms::{CounterState, Decision};
pub use limiter::{DecisionKind, RateDecision, RateLimiter};
pub use middleware::{rate_limit_middleware, RateLimitState};
pub use redis_store::RedisCounterStore;
pub use store::{CounterStore, MemoryCounterStore};
