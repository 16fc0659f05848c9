//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout)
//!     → tenant middleware (attach context or 400)
//!     → rate limit middleware (429 with Retry-After on deny)
//!     → signature middleware (401 with reason on failure)
//!     → downstream handler
//! ```

pub mod server;

pub use server::HttpServer;
