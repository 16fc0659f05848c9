//! Ordered resolver chain.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::schema::{ResolverKind, TenantSettings};
use crate::observability::metrics;
use crate::tenant::context::{TenantContext, TenantRegistry};
use crate::tenant::resolvers::{
    HeaderResolver, PortMapResolver, QueryParamResolver, RequestInfo, SubdomainResolver,
    TenantResolver,
};

/// Tries resolver strategies in configured order and returns the first
/// match. A resolver error is logged and treated as "no match" so the
/// remaining strategies still get a chance.
pub struct ResolutionChain {
    resolvers: Vec<Box<dyn TenantResolver>>,
}

impl ResolutionChain {
    pub fn new(resolvers: Vec<Box<dyn TenantResolver>>) -> Self {
        Self { resolvers }
    }

    /// Build the chain from config, in the configured order.
    pub fn from_settings(settings: &TenantSettings, registry: Arc<dyn TenantRegistry>) -> Self {
        let port_map: HashMap<u16, String> = settings
            .port_map
            .iter()
            .filter_map(|(port, code)| port.parse::<u16>().ok().map(|p| (p, code.clone())))
            .collect();

        let resolvers = settings
            .resolver_order
            .iter()
            .map(|kind| -> Box<dyn TenantResolver> {
                match kind {
                    ResolverKind::Subdomain => Box::new(SubdomainResolver::new(
                        &settings.base_domain,
                        registry.clone(),
                    )),
                    ResolverKind::Header => Box::new(HeaderResolver::new(registry.clone())),
                    ResolverKind::Port => {
                        Box::new(PortMapResolver::new(port_map.clone(), registry.clone()))
                    }
                    ResolverKind::Query => Box::new(QueryParamResolver::new(registry.clone())),
                }
            })
            .collect();

        Self::new(resolvers)
    }

    /// First non-none result wins; later resolvers are not invoked.
    pub fn resolve(&self, request: &RequestInfo) -> Option<TenantContext> {
        for resolver in &self.resolvers {
            match resolver.resolve(request) {
                Ok(Some(context)) => {
                    tracing::debug!(
                        strategy = resolver.name(),
                        tenant = %context.tenant_code,
                        "tenant resolved"
                    );
                    metrics::record_tenant_resolved(resolver.name());
                    return Some(context);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        strategy = resolver.name(),
                        error = %e,
                        "tenant resolver failed, trying next"
                    );
                }
            }
        }
        None
    }
}
