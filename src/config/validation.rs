//! Configuration validation.
//!
//! Semantic checks on top of serde's syntactic ones. Returns all
//! validation errors, not just the first, so an operator fixes a config
//! in one pass.

use std::fmt;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration. Pure function, runs before the config is
/// accepted into the system.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "not a valid socket address",
        ));
    }

    for (name, policy) in &config.rate_limit.resources {
        if policy.max_requests == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.resources.{name}.max_requests"),
                "must be greater than zero",
            ));
        }
        if policy.window_secs == 0 {
            errors.push(ValidationError::new(
                format!("rate_limit.resources.{name}.window_secs"),
                "must be greater than zero",
            ));
        }
    }

    if config.rate_limit.burst_multiplier < 1.0 {
        errors.push(ValidationError::new(
            "rate_limit.burst_multiplier",
            "must be at least 1.0",
        ));
    }

    for route in &config.rate_limit.routes {
        if !config.rate_limit.resources.contains_key(&route.resource) {
            errors.push(ValidationError::new(
                "rate_limit.routes",
                format!(
                    "route {} references unknown resource {}",
                    route.path_prefix, route.resource
                ),
            ));
        }
    }

    if config.signing.time_window_secs <= 0 {
        errors.push(ValidationError::new(
            "signing.time_window_secs",
            "must be greater than zero",
        ));
    }
    if config.signing.required && config.signing.keys.is_empty() {
        errors.push(ValidationError::new(
            "signing.keys",
            "signature enforcement enabled but no keys configured",
        ));
    }

    if config.webhook.max_age_secs <= 0 {
        errors.push(ValidationError::new(
            "webhook.max_age_secs",
            "must be greater than zero",
        ));
    }

    for port in config.tenant.port_map.keys() {
        if port.parse::<u16>().is_err() {
            errors.push(ValidationError::new(
                "tenant.port_map",
                format!("{port} is not a valid port number"),
            ));
        }
    }
    if config.tenant.required && config.tenant.resolver_order.is_empty() {
        errors.push(ValidationError::new(
            "tenant.resolver_order",
            "tenant required but no resolvers configured",
        ));
    }

    let mut seen = std::collections::BTreeSet::new();
    for seed in &config.tenant.tenants {
        if seed.id.is_empty() || seed.code.is_empty() {
            errors.push(ValidationError::new(
                "tenant.tenants",
                "tenant entries need a non-empty id and code",
            ));
        }
        if !seed.id.is_empty() && !seen.insert(seed.id.clone()) {
            errors.push(ValidationError::new(
                "tenant.tenants",
                format!("duplicate tenant id {}", seed.id),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
