//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build stores, limiter, signer state and the tenant chain from config
//! - Wire the middleware stack in the contract order:
//!   tenant resolution → rate limiting → signature verification → handler
//! - Serve with graceful shutdown, config hot reload, periodic sweeping

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    http::Request,
    middleware,
    response::IntoResponse,
    routing::any,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::clock::{Clock, SystemClock};
use crate::config::schema::GatewayConfig;
use crate::error::StoreError;
use crate::ratelimit::middleware::{rate_limit_middleware, RateLimitState};
use crate::ratelimit::redis_store::RedisCounterStore;
use crate::ratelimit::RateLimiter;
use crate::signing::middleware::{signature_middleware, ConfigSecretKeys, SigningState};
use crate::signing::nonce::{MemoryNonceStore, NonceStore, RedisNonceStore};
use crate::tenant::chain::ResolutionChain;
use crate::tenant::context::{StaticTenantRegistry, TenantContext, TenantRegistry};
use crate::tenant::middleware::{tenant_middleware, TenantState};

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: Arc<ArcSwap<GatewayConfig>>,
    limiter: Arc<RateLimiter>,
    nonces: Arc<dyn NonceStore>,
    clock: Arc<dyn Clock>,
}

impl HttpServer {
    /// Build the server and its shared state from configuration.
    ///
    /// Limits, flags and keys hot-reload through the config swap; the
    /// tenant registry/chain and the store backend are fixed at startup.
    pub async fn build(config: GatewayConfig) -> Result<Self, StoreError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        Self::build_with(config, clock, None).await
    }

    /// Build with an injected clock and tenant registry (tests,
    /// embedders with database-backed registries).
    pub async fn build_with(
        config: GatewayConfig,
        clock: Arc<dyn Clock>,
        registry: Option<Arc<dyn TenantRegistry>>,
    ) -> Result<Self, StoreError> {
        let local_port = config
            .listener
            .bind_address
            .rsplit(':')
            .next()
            .and_then(|p| p.parse::<u16>().ok());

        let (limiter, nonces): (Arc<RateLimiter>, Arc<dyn NonceStore>) = if config.redis.enabled {
            let store =
                RedisCounterStore::connect(&config.redis.url, &config.redis.key_prefix).await?;
            let nonces = Arc::new(RedisNonceStore::new(
                store.connection(),
                &config.redis.key_prefix,
            ));
            (
                Arc::new(RateLimiter::distributed(Arc::new(store), clock.clone())),
                nonces,
            )
        } else {
            (
                Arc::new(RateLimiter::local(clock.clone())),
                Arc::new(MemoryNonceStore::new()),
            )
        };

        let registry = registry.unwrap_or_else(|| {
            Arc::new(StaticTenantRegistry::from_seeds(&config.tenant.tenants))
        });
        let chain = Arc::new(ResolutionChain::from_settings(&config.tenant, registry));

        let shared_config = Arc::new(ArcSwap::from_pointee(config));

        let tenant_state = TenantState {
            chain,
            config: shared_config.clone(),
            local_port,
        };
        let rate_limit_state = RateLimitState {
            limiter: limiter.clone(),
            config: shared_config.clone(),
        };
        let signing_state = SigningState {
            config: shared_config.clone(),
            secrets: Arc::new(ConfigSecretKeys::new(shared_config.clone())),
            nonces: nonces.clone(),
            clock: clock.clone(),
        };

        let current = shared_config.load_full();
        let router = Self::build_router(&current, tenant_state, rate_limit_state, signing_state);

        Ok(Self {
            router,
            config: shared_config,
            limiter,
            nonces,
            clock,
        })
    }

    /// Assemble the middleware stack. Layers run outermost-last, so the
    /// request passes tenant → rate limit → signature before the handler.
    fn build_router(
        config: &GatewayConfig,
        tenant_state: TenantState,
        rate_limit_state: RateLimitState,
        signing_state: SigningState,
    ) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .layer(middleware::from_fn_with_state(
                signing_state,
                signature_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                rate_limit_state,
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                tenant_state,
                tenant_middleware,
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        // apply hot reloads
        let config = self.config.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                tracing::info!("Applying updated configuration");
                config.store(Arc::new(new_config));
            }
        });

        // periodic sweep of expired counters, bans and nonces; lazy
        // on-access expiry stays the correctness mechanism, this bounds
        // memory
        let limiter = self.limiter.clone();
        let nonces = self.nonces.clone();
        let clock = self.clock.clone();
        let sweep_secs = self.config.load().rate_limit.sweep_interval_secs.max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = limiter.sweep().await {
                    tracing::warn!(error = %e, "counter sweep failed");
                }
                if let Err(e) = nonces.sweep(clock.now()).await {
                    tracing::warn!(error = %e, "nonce sweep failed");
                }
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Stand-in for the protected downstream application. Everything that
/// reaches this point has passed tenant resolution, rate limiting and
/// signature verification.
async fn gateway_handler(request: Request<Body>) -> impl IntoResponse {
    let tenant = request
        .extensions()
        .get::<TenantContext>()
        .map(|t| t.tenant_code.clone());

    Json(json!({
        "ok": true,
        "method": request.method().as_str(),
        "path": request.uri().path(),
        "tenant": tenant,
    }))
}
