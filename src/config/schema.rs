//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! gateway. All types derive Serde traits for deserialization from config
//! files, and every section has a usable default so minimal configs work.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitSettings,

    /// Request signature verification settings.
    pub signing: SigningSettings,

    /// Outbound/inbound webhook signing settings.
    pub webhook: WebhookSettings,

    /// Signed URL settings.
    pub signed_url: SignedUrlSettings,

    /// Tenant resolution settings.
    pub tenant: TenantSettings,

    /// Shared-state backend (Redis) settings.
    pub redis: RedisSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Rate limiting algorithm selector, per resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Burst-friendly bucket with continuous refill.
    TokenBucket,
    /// Exact trailing-window timestamps; the most accurate and the default.
    #[default]
    SlidingWindow,
    /// O(1) counter per wall-clock bucket. Allows up to 2x the limit at a
    /// window boundary; kept for low-stakes resources that want cheapness.
    FixedWindow,
    /// Smoothed acceptance rate; drains continuously.
    LeakyBucket,
}

/// What to do when the shared backend is unreachable for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fall back to the process-local store; keeps enforcing, loses
    /// cross-instance accuracy. Right choice for security-relevant
    /// resources.
    #[default]
    Degrade,
    /// Allow the request through. Only for best-effort resources.
    Open,
}

/// Limit for one named resource.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourcePolicy {
    /// Maximum requests per window. Must be > 0.
    pub max_requests: u32,

    /// Window length in seconds. Must be > 0.
    pub window_secs: u64,

    /// Counting algorithm.
    pub algorithm: Algorithm,

    /// Behavior when the shared backend errors.
    pub failure_policy: FailurePolicy,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
            algorithm: Algorithm::SlidingWindow,
            failure_policy: FailurePolicy::Degrade,
        }
    }
}

impl ResourcePolicy {
    pub fn new(max_requests: u32, window_secs: u64, algorithm: Algorithm) -> Self {
        Self {
            max_requests,
            window_secs,
            algorithm,
            failure_policy: FailurePolicy::Degrade,
        }
    }
}

/// Maps a path prefix to a named resource policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteLimit {
    /// Path prefix to match (longest prefix wins).
    pub path_prefix: String,

    /// Resource name to charge the request against.
    pub resource: String,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Master switch. Disabling is the operational escape hatch and must
    /// be set explicitly; the default is enforcing.
    pub enabled: bool,

    /// Token bucket capacity multiplier over max_requests.
    pub burst_multiplier: f64,

    /// Named per-resource limits. Unknown resources use "global".
    pub resources: BTreeMap<String, ResourcePolicy>,

    /// Path prefix to resource mapping used by the middleware.
    pub routes: Vec<RouteLimit>,

    /// Derived client keys that bypass rate limiting entirely
    /// (health checkers, internal probes).
    pub exempt: Vec<String>,

    /// Interval for the background sweep of expired counters/bans.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        let mut resources = BTreeMap::new();
        resources.insert(
            "global".to_string(),
            ResourcePolicy::new(60, 60, Algorithm::SlidingWindow),
        );
        resources.insert(
            "api".to_string(),
            ResourcePolicy::new(100, 60, Algorithm::SlidingWindow),
        );
        resources.insert(
            "auth".to_string(),
            ResourcePolicy::new(5, 60, Algorithm::SlidingWindow),
        );
        resources.insert(
            "expensive".to_string(),
            ResourcePolicy::new(10, 60, Algorithm::TokenBucket),
        );

        Self {
            enabled: true,
            burst_multiplier: 1.5,
            resources,
            routes: vec![
                RouteLimit {
                    path_prefix: "/api".to_string(),
                    resource: "api".to_string(),
                },
                RouteLimit {
                    path_prefix: "/auth".to_string(),
                    resource: "auth".to_string(),
                },
            ],
            exempt: Vec::new(),
            sweep_interval_secs: 60,
        }
    }
}

impl RateLimitSettings {
    /// Resolve the policy for a named resource, falling back to "global".
    pub fn policy_for(&self, resource: &str) -> ResourcePolicy {
        self.resources
            .get(resource)
            .or_else(|| self.resources.get("global"))
            .cloned()
            .unwrap_or_default()
    }

    /// Map a request path to its resource name via longest prefix match.
    pub fn resource_for_path(&self, path: &str) -> &str {
        self.routes
            .iter()
            .filter(|r| path.starts_with(&r.path_prefix))
            .max_by_key(|r| r.path_prefix.len())
            .map(|r| r.resource.as_str())
            .unwrap_or("global")
    }
}

/// HMAC digest selector for request signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
    Sha3_256,
}

/// Configurable signature header names.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignatureHeaders {
    pub signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub key_id: String,
}

impl Default for SignatureHeaders {
    fn default() -> Self {
        Self {
            signature: "x-signature".to_string(),
            timestamp: "x-timestamp".to_string(),
            nonce: "x-nonce".to_string(),
            key_id: "x-key-id".to_string(),
        }
    }
}

/// Request signature verification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningSettings {
    /// Enforce signatures on inbound requests.
    pub required: bool,

    /// Accepted clock skew, seconds, boundary inclusive.
    pub time_window_secs: i64,

    /// HMAC digest family.
    pub digest: DigestAlgorithm,

    /// Reject nonce reuse. Requires a nonce store; with the in-memory
    /// store this is only correct for a single-process deployment.
    pub check_replay: bool,

    /// Header names carrying the signature material.
    pub headers: SignatureHeaders,

    /// Shared secrets keyed by key id.
    pub keys: BTreeMap<String, String>,
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            required: false,
            time_window_secs: 300,
            digest: DigestAlgorithm::Sha256,
            check_replay: true,
            headers: SignatureHeaders::default(),
            keys: BTreeMap::new(),
        }
    }
}

/// Webhook signing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Shared secret for webhook HMACs.
    pub secret: String,

    /// Maximum accepted age of a timestamped webhook, seconds.
    pub max_age_secs: i64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            max_age_secs: 300,
        }
    }
}

/// Signed URL settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SignedUrlSettings {
    /// Shared secret for URL HMACs.
    pub secret: String,
}

/// Resolver strategy selector for the tenant chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    Subdomain,
    Header,
    Port,
    Query,
}

/// Static tenant registry seed entry.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TenantSeed {
    pub id: String,
    pub code: String,
    pub name: String,
    pub subdomain: Option<String>,
    pub template_id: Option<String>,
    pub store_id: Option<String>,
    pub settings: BTreeMap<String, String>,
}

/// Tenant resolution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TenantSettings {
    /// Reject requests that resolve no tenant.
    pub required: bool,

    /// Base domain stripped by the subdomain resolver
    /// (e.g. "example.com" turns "acme.example.com" into "acme").
    pub base_domain: String,

    /// Resolver strategies, tried in order. Order is a deployment
    /// decision: production wants subdomain first, development wants the
    /// port map first.
    pub resolver_order: Vec<ResolverKind>,

    /// Local listener port to tenant code, for the port resolver.
    /// Keys are decimal port numbers.
    pub port_map: BTreeMap<String, String>,

    /// Seed entries for the built-in in-memory registry. Embedders may
    /// inject their own registry instead.
    pub tenants: Vec<TenantSeed>,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            required: false,
            base_domain: String::new(),
            resolver_order: vec![
                ResolverKind::Subdomain,
                ResolverKind::Header,
                ResolverKind::Query,
            ],
            port_map: BTreeMap::new(),
            tenants: Vec::new(),
        }
    }
}

/// Shared-state backend settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisSettings {
    /// Use Redis for counters, bans and nonces. Off means process-local
    /// state, which is only correct for a single-instance deployment.
    pub enabled: bool,

    /// Connection URL.
    pub url: String,

    /// Key prefix so several deployments can share one instance.
    pub key_prefix: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "redis://127.0.0.1/".to_string(),
            key_prefix: "gatekeeper:".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
