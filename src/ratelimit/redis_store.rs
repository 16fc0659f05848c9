//! Redis-backed counter store for multi-instance deployments.
//!
//! Each `apply` is a single Lua script invocation, so the
//! read-modify-write is atomic under concurrent callers from any number
//! of gateway instances. The scripts mirror the pure algorithm functions
//! in `algorithms.rs`; floats cross the boundary as strings because Lua
//! replies truncate numbers to integers.
//!
//! Key TTLs implement the `2 * window` idle eviction rule, so no sweep
//! is needed on this backend.

use redis::aio::ConnectionManager;
use redis::{Client, Script};

use async_trait::async_trait;

use crate::config::schema::{Algorithm, ResourcePolicy};
use crate::error::StoreError;
use crate::ratelimit::algorithms::Decision;
use crate::ratelimit::store::CounterStore;

const TOKEN_BUCKET_SCRIPT: &str = r#"
local max = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local capacity = tonumber(ARGV[3])
local now = tonumber(ARGV[4])
local data = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local tokens = tonumber(data[1])
local ts = tonumber(data[2])
if tokens == nil then
  tokens = capacity
  ts = now
end
local elapsed = math.max(0, now - ts)
tokens = math.min(capacity, tokens + elapsed / window * max)
local allowed = 0
local retry = 0
if tokens >= 1 then
  allowed = 1
  tokens = tokens - 1
else
  retry = (1 - tokens) / max * window
end
redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', tostring(now))
redis.call('EXPIRE', KEYS[1], math.ceil(window * 2))
return {allowed, math.floor(tokens), tostring(retry)}
"#;

const SLIDING_WINDOW_SCRIPT: &str = r#"
local max = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local count = redis.call('ZCARD', KEYS[1])
if count < max then
  redis.call('ZADD', KEYS[1], tostring(now), ARGV[4])
  redis.call('EXPIRE', KEYS[1], math.ceil(window * 2))
  local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
  return {1, max - count - 1, '0', tostring(tonumber(oldest[2]) + window)}
end
local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
local oldest_ts = tonumber(oldest[2])
return {0, 0, tostring(window - (now - oldest_ts)), tostring(oldest_ts + window)}
"#;

const FIXED_WINDOW_SCRIPT: &str = r#"
local max = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])
local count = tonumber(redis.call('GET', KEYS[1]) or '0')
if count < max then
  redis.call('INCR', KEYS[1])
  redis.call('EXPIRE', KEYS[1], ttl)
  return {1, max - count - 1}
end
return {0, 0}
"#;

const LEAKY_BUCKET_SCRIPT: &str = r#"
local max = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local data = redis.call('HMGET', KEYS[1], 'level', 'ts')
local level = tonumber(data[1])
local ts = tonumber(data[2])
if level == nil then
  level = 0
  ts = now
end
local elapsed = math.max(0, now - ts)
level = math.max(0, level - elapsed * max / window)
local allowed = 0
local retry = 0
if level < max then
  allowed = 1
  level = level + 1
else
  retry = (level - max + 1) * window / max
end
redis.call('HSET', KEYS[1], 'level', tostring(level), 'ts', tostring(now))
redis.call('EXPIRE', KEYS[1], math.ceil(window * 2))
return {allowed, math.floor(math.max(0, max - level)), tostring(retry)}
"#;

/// Distributed counter store.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    prefix: String,
    token_bucket: Script,
    sliding_window: Script,
    fixed_window: Script,
    leaky_bucket: Script,
}

impl RedisCounterStore {
    /// Connect and prepare the scripts.
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::with_connection(conn, prefix))
    }

    pub fn with_connection(conn: ConnectionManager, prefix: &str) -> Self {
        Self {
            conn,
            prefix: prefix.to_string(),
            token_bucket: Script::new(TOKEN_BUCKET_SCRIPT),
            sliding_window: Script::new(SLIDING_WINDOW_SCRIPT),
            fixed_window: Script::new(FIXED_WINDOW_SCRIPT),
            leaky_bucket: Script::new(LEAKY_BUCKET_SCRIPT),
        }
    }

    /// A clone of the underlying connection, for sharing with the nonce
    /// store.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    fn counter_key(&self, key: &str) -> String {
        format!("{}rl:{}", self.prefix, key)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn apply(
        &self,
        key: &str,
        policy: &ResourcePolicy,
        burst_multiplier: f64,
        now: f64,
    ) -> Result<Decision, StoreError> {
        let mut conn = self.conn.clone();
        let max = policy.max_requests as i64;
        let window = policy.window_secs as f64;

        match policy.algorithm {
            Algorithm::TokenBucket => {
                let capacity = policy.max_requests as f64 * burst_multiplier;
                let (allowed, remaining, retry): (i64, i64, String) = self
                    .token_bucket
                    .key(self.counter_key(key))
                    .arg(max)
                    .arg(window)
                    .arg(capacity)
                    .arg(now)
                    .invoke_async(&mut conn)
                    .await?;
                let retry_after = parse_float(&retry)?;
                Ok(decision(allowed, remaining, retry_after, if allowed == 1 {
                    now + window
                } else {
                    now + retry_after
                }))
            }

            Algorithm::SlidingWindow => {
                // member must be unique per request at equal timestamps
                let member = format!("{now}-{}", fastrand::u64(..));
                let (allowed, remaining, retry, reset): (i64, i64, String, String) = self
                    .sliding_window
                    .key(self.counter_key(key))
                    .arg(max)
                    .arg(window)
                    .arg(now)
                    .arg(member)
                    .invoke_async(&mut conn)
                    .await?;
                Ok(decision(
                    allowed,
                    remaining,
                    parse_float(&retry)?,
                    parse_float(&reset)?,
                ))
            }

            Algorithm::FixedWindow => {
                let window_id = (now / window).floor() as u64;
                let bucket_key = format!("{}:{}", self.counter_key(key), window_id);
                let ttl = (policy.window_secs * 2).max(1);
                let (allowed, remaining): (i64, i64) = self
                    .fixed_window
                    .key(bucket_key)
                    .arg(max)
                    .arg(ttl)
                    .invoke_async(&mut conn)
                    .await?;
                let reset = (window_id + 1) as f64 * window;
                let retry_after = if allowed == 1 { 0.0 } else { reset - now };
                Ok(decision(allowed, remaining, retry_after, reset))
            }

            Algorithm::LeakyBucket => {
                let (allowed, remaining, retry): (i64, i64, String) = self
                    .leaky_bucket
                    .key(self.counter_key(key))
                    .arg(max)
                    .arg(window)
                    .arg(now)
                    .invoke_async(&mut conn)
                    .await?;
                let retry_after = parse_float(&retry)?;
                Ok(decision(allowed, remaining, retry_after, now + retry_after))
            }
        }
    }

    async fn record_violation(&self, client: &str, _now: f64) -> Result<u32, StoreError> {
        let mut conn = self.conn.clone();
        let key = format!("{}viol:{}", self.prefix, client);
        let count: u32 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        let _: () = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(3600)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn set_ban(&self, client: &str, until: f64, now: f64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let now_ttl = (until - now).ceil().max(1.0) as u64;
        let ban_key = format!("{}ban:{}", self.prefix, client);
        let _: () = redis::cmd("SET")
            .arg(&ban_key)
            .arg(until)
            .arg("EX")
            .arg(now_ttl)
            .query_async(&mut conn)
            .await?;
        // the violation record dies with the ban, which is what clears
        // the count once the ban has been served
        let viol_key = format!("{}viol:{}", self.prefix, client);
        let _: () = redis::cmd("EXPIRE")
            .arg(&viol_key)
            .arg(now_ttl)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn active_ban(&self, client: &str, now: f64) -> Result<Option<f64>, StoreError> {
        let mut conn = self.conn.clone();
        let ban_key = format!("{}ban:{}", self.prefix, client);
        let until: Option<f64> = redis::cmd("GET")
            .arg(&ban_key)
            .query_async(&mut conn)
            .await?;
        Ok(until.filter(|&u| u > now))
    }

    async fn sweep_expired(&self, _now: f64) -> Result<usize, StoreError> {
        // key TTLs already bound memory on this backend
        Ok(0)
    }
}

fn decision(allowed: i64, remaining: i64, retry_after: f64, reset: f64) -> Decision {
    Decision {
        allowed: allowed == 1,
        remaining: remaining.max(0) as u32,
        retry_after,
        reset,
    }
}

fn parse_float(s: &str) -> Result<f64, StoreError> {
    s.parse::<f64>()
        .map_err(|_| StoreError::Protocol(format!("expected float, got {s:?}")))
}
