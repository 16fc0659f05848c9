//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use gatekeeper::config::schema::GatewayConfig;
use gatekeeper::http::HttpServer;
use gatekeeper::lifecycle::Shutdown;
use tokio::sync::mpsc;

/// Bind the gateway on the config's address and serve in the
/// background. The returned Shutdown must stay alive for the duration
/// of the test; dropping it stops the server.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let addr: SocketAddr = config
        .listener
        .bind_address
        .parse()
        .expect("test bind address");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let server = HttpServer::build(config).await.unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (_config_tx, config_updates) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    (addr, shutdown)
}

#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Current unix time as the signer sees it.
#[allow(dead_code)]
pub fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
