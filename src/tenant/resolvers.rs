//! Tenant resolver strategies.
//!
//! Each resolver answers one question: does this request tell me which
//! tenant it belongs to? Errors are soft; the chain logs them and moves
//! on to the next strategy.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::tenant::context::{TenantContext, TenantRegistry};

/// Resolver-internal failure (registry outage etc.). Treated by the
/// chain as "no match", never as an abort.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("registry unavailable: {0}")]
    Registry(String),
}

/// The request fields resolvers may consult. Extracted once by the
/// middleware so resolvers stay framework-agnostic.
#[derive(Debug, Default, Clone)]
pub struct RequestInfo {
    /// Host header, as sent (may include a port).
    pub host: Option<String>,
    /// Explicit tenant id header.
    pub tenant_id_header: Option<String>,
    /// Explicit tenant code header.
    pub tenant_code_header: Option<String>,
    /// `tenant` query parameter.
    pub tenant_query: Option<String>,
    /// Local port the connection arrived on.
    pub local_port: Option<u16>,
}

/// One strategy in the resolution chain.
pub trait TenantResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, request: &RequestInfo) -> Result<Option<TenantContext>, ResolveError>;
}

/// Strips the configured base domain from the Host header and looks the
/// remaining label up in the registry.
pub struct SubdomainResolver {
    base_domain: String,
    registry: Arc<dyn TenantRegistry>,
}

impl SubdomainResolver {
    pub fn new(base_domain: &str, registry: Arc<dyn TenantRegistry>) -> Self {
        Self {
            base_domain: base_domain.to_ascii_lowercase(),
            registry,
        }
    }
}

impl TenantResolver for SubdomainResolver {
    fn name(&self) -> &'static str {
        "subdomain"
    }

    fn resolve(&self, request: &RequestInfo) -> Result<Option<TenantContext>, ResolveError> {
        if self.base_domain.is_empty() {
            return Ok(None);
        }
        let Some(host) = &request.host else {
            return Ok(None);
        };
        // host header may carry a port
        let host = host.split(':').next().unwrap_or("").to_ascii_lowercase();
        let Some(label) = host.strip_suffix(&format!(".{}", self.base_domain)) else {
            return Ok(None);
        };
        if label.is_empty() || label.contains('.') {
            return Ok(None);
        }
        Ok(self.registry.lookup(label))
    }
}

/// Reads an explicit tenant id or code header.
pub struct HeaderResolver {
    registry: Arc<dyn TenantRegistry>,
}

impl HeaderResolver {
    pub fn new(registry: Arc<dyn TenantRegistry>) -> Self {
        Self { registry }
    }
}

impl TenantResolver for HeaderResolver {
    fn name(&self) -> &'static str {
        "header"
    }

    fn resolve(&self, request: &RequestInfo) -> Result<Option<TenantContext>, ResolveError> {
        let identifier = request
            .tenant_id_header
            .as_deref()
            .or(request.tenant_code_header.as_deref());
        Ok(identifier.and_then(|id| self.registry.lookup(id)))
    }
}

/// Maps the connection's local port to a tenant code. Development
/// convenience: run one listener per tenant without DNS.
pub struct PortMapResolver {
    map: HashMap<u16, String>,
    registry: Arc<dyn TenantRegistry>,
}

impl PortMapResolver {
    pub fn new(map: HashMap<u16, String>, registry: Arc<dyn TenantRegistry>) -> Self {
        Self { map, registry }
    }
}

impl TenantResolver for PortMapResolver {
    fn name(&self) -> &'static str {
        "port"
    }

    fn resolve(&self, request: &RequestInfo) -> Result<Option<TenantContext>, ResolveError> {
        let Some(port) = request.local_port else {
            return Ok(None);
        };
        Ok(self
            .map
            .get(&port)
            .and_then(|code| self.registry.lookup(code)))
    }
}

/// Fallback: a `tenant` query parameter carrying an id or code.
pub struct QueryParamResolver {
    registry: Arc<dyn TenantRegistry>,
}

impl QueryParamResolver {
    pub fn new(registry: Arc<dyn TenantRegistry>) -> Self {
        Self { registry }
    }
}

impl TenantResolver for QueryParamResolver {
    fn name(&self) -> &'static str {
        "query"
    }

    fn resolve(&self, request: &RequestInfo) -> Result<Option<TenantContext>, ResolveError> {
        Ok(request
            .tenant_query
            .as_deref()
            .and_then(|id| self.registry.lookup(id)))
    }
}
