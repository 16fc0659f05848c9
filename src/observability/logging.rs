//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Honor RUST_LOG over the configured level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Violation logs carry the hashed client identity, never raw
//!   peer address or user agent

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber. Call once at startup.
pub fn init_logging(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("gatekeeper={default_level},tower_http=warn"))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
