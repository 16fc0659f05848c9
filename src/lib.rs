//! Request-integrity and abuse-control gateway core.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod ratelimit;
pub mod signing;
pub mod tenant;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use identity::ClientIdentity;
pub use lifecycle::Shutdown;
pub use ratelimit::RateLimiter;
pub use signing::{RequestSigner, SignedUrlBuilder, WebhookSigner};
pub use tenant::TenantContext;
