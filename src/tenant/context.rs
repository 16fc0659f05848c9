//! Tenant context and registry seam.

use std::collections::{BTreeMap, HashMap};

use crate::config::schema::TenantSeed;

/// Resolved tenant identity, attached to request extensions once per
/// request and read-only downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
    pub tenant_code: String,
    pub tenant_name: String,
    pub subdomain: Option<String>,
    pub template_id: Option<String>,
    pub store_id: Option<String>,
    pub settings: BTreeMap<String, String>,
}

impl From<&TenantSeed> for TenantContext {
    fn from(seed: &TenantSeed) -> Self {
        Self {
            tenant_id: seed.id.clone(),
            tenant_code: seed.code.clone(),
            tenant_name: seed.name.clone(),
            subdomain: seed.subdomain.clone(),
            template_id: seed.template_id.clone(),
            store_id: seed.store_id.clone(),
            settings: seed.settings.clone(),
        }
    }
}

/// Tenant lookup seam. The surrounding application usually backs this
/// with a database-fed cache; the gateway only asks for a context by
/// identifier (id, code, or subdomain label).
pub trait TenantRegistry: Send + Sync {
    fn lookup(&self, identifier: &str) -> Option<TenantContext>;
}

/// Registry over a fixed set of tenants, indexed by id, code and
/// subdomain. Built from config seeds; fine for development and small
/// fleets.
pub struct StaticTenantRegistry {
    by_identifier: HashMap<String, TenantContext>,
}

impl StaticTenantRegistry {
    pub fn from_seeds(seeds: &[TenantSeed]) -> Self {
        let mut by_identifier = HashMap::new();
        for seed in seeds {
            let context = TenantContext::from(seed);
            by_identifier.insert(seed.id.clone(), context.clone());
            by_identifier.insert(seed.code.clone(), context.clone());
            if let Some(subdomain) = &seed.subdomain {
                by_identifier.insert(subdomain.clone(), context);
            }
        }
        Self { by_identifier }
    }
}

impl TenantRegistry for StaticTenantRegistry {
    fn lookup(&self, identifier: &str) -> Option<TenantContext> {
        self.by_identifier.get(identifier).cloned()
    }
}
