//! Tenant resolution subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → middleware.rs (extract host/headers/query/port once)
//!     → chain.rs (resolvers in configured order, first match wins)
//!     → resolvers.rs (subdomain, header, port map, query param)
//!     → context.rs (registry lookup)
//!     → attach TenantContext to extensions + response headers,
//!       or 400 when the route requires a tenant
//! ```
//!
//! # Design Decisions
//! - Resolver order is configuration: production leads with subdomain,
//!   development with the port map
//! - A resolver error is "no match", never a chain abort
//! - The registry is a seam; the built-in static registry serves config
//!   seeds, embedders inject their database-backed one

pub mod chain;
pub mod context;
pub mod middleware;
pub mod resolvers;

pub use chain::ResolutionChain;
pub use context::{StaticTenantRegistry, TenantContext, TenantRegistry};
pub use middleware::{tenant_middleware, TenantState};
pub use resolvers::{
    HeaderResolver, PortMapResolver, QueryParamResolver, RequestInfo, ResolveError,
    SubdomainResolver, TenantResolver,
};
