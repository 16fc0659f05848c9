//! Rate limiting behavior over HTTP.

use gatekeeper::config::schema::{Algorithm, GatewayConfig, ResourcePolicy};
use gatekeeper::identity::ClientIdentity;

mod common;

fn config_on_port(port: u16) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = format!("127.0.0.1:{port}");
    config.observability.metrics_enabled = false;
    config
}

#[tokio::test]
async fn test_limit_enforced_with_headers() {
    let mut config = config_on_port(28210);
    config.rate_limit.resources.insert(
        "global".to_string(),
        ResourcePolicy::new(3, 60, Algorithm::SlidingWindow),
    );
    let (addr, _shutdown) = common::start_gateway(config).await;
    let client = common::client();

    for i in 0..3 {
        let res = client
            .get(format!("http://{addr}/anything"))
            .send()
            .await
            .expect("gateway unreachable");
        assert_eq!(res.status(), 200, "request {i}");
        let remaining: u32 = res
            .headers()
            .get("x-ratelimit-remaining")
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(remaining, 2 - i);
    }

    let res = client
        .get(format!("http://{addr}/anything"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
    assert!(res.headers().contains_key("retry-after"));
    assert_eq!(
        res.headers().get("x-ratelimit-remaining").unwrap(),
        "0"
    );
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "rate_limit_exceeded");
}

#[tokio::test]
async fn test_disabled_flag_allows_everything() {
    let mut config = config_on_port(28211);
    config.rate_limit.enabled = false;
    config.rate_limit.resources.insert(
        "global".to_string(),
        ResourcePolicy::new(1, 60, Algorithm::SlidingWindow),
    );
    let (addr, _shutdown) = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..20 {
        let res = client
            .get(format!("http://{addr}/anything"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        // bypassed requests are not counted, so no budget headers
        assert!(!res.headers().contains_key("x-ratelimit-remaining"));
    }
}

#[tokio::test]
async fn test_ban_after_repeated_violations() {
    let mut config = config_on_port(28212);
    config.rate_limit.resources.insert(
        "global".to_string(),
        ResourcePolicy::new(1, 60, Algorithm::SlidingWindow),
    );
    let (addr, _shutdown) = common::start_gateway(config).await;
    let client = common::client();

    let url = format!("http://{addr}/anything");
    assert_eq!(client.get(&url).send().await.unwrap().status(), 200);

    // five denials accumulate five violations; the fifth sets a 300s ban
    for _ in 0..5 {
        assert_eq!(client.get(&url).send().await.unwrap().status(), 429);
    }

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 429);
    let retry_after: f64 = res
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(
        (250.0..=301.0).contains(&retry_after),
        "expected a ~300s ban, got {retry_after}"
    );
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "banned");
}

#[tokio::test]
async fn test_exempt_client_bypasses_limits() {
    let mut config = config_on_port(28213);
    config.rate_limit.resources.insert(
        "global".to_string(),
        ResourcePolicy::new(1, 60, Algorithm::SlidingWindow),
    );
    let probe = ClientIdentity::from_parts(Some("health-probe"), "127.0.0.1".parse().unwrap(), None);
    config.rate_limit.exempt.push(probe.as_str().to_string());
    let (addr, _shutdown) = common::start_gateway(config).await;
    let client = common::client();

    for _ in 0..10 {
        let res = client
            .get(format!("http://{addr}/anything"))
            .header("x-client-id", "health-probe")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }
}

#[tokio::test]
async fn test_separate_clients_have_separate_budgets() {
    let mut config = config_on_port(28214);
    config.rate_limit.resources.insert(
        "global".to_string(),
        ResourcePolicy::new(1, 60, Algorithm::SlidingWindow),
    );
    let (addr, _shutdown) = common::start_gateway(config).await;
    let client = common::client();

    let url = format!("http://{addr}/anything");
    assert_eq!(
        client
            .get(&url)
            .header("x-client-id", "alice")
            .send()
            .await
            .unwrap()
            .status(),
        200
    );
    assert_eq!(
        client
            .get(&url)
            .header("x-client-id", "alice")
            .send()
            .await
            .unwrap()
            .status(),
        429
    );
    // bob is unaffected by alice's exhaustion
    assert_eq!(
        client
            .get(&url)
            .header("x-client-id", "bob")
            .send()
            .await
            .unwrap()
            .status(),
        200
    );
}

#[tokio::test]
async fn test_route_maps_to_configured_resource() {
    let mut config = config_on_port(28215);
    config.rate_limit.resources.insert(
        "auth".to_string(),
        ResourcePolicy::new(2, 60, Algorithm::SlidingWindow),
    );
    let (addr, _shutdown) = common::start_gateway(config).await;
    let client = common::client();

    // /auth draws from the strict auth budget
    for _ in 0..2 {
        assert_eq!(
            client
                .get(format!("http://{addr}/auth/login"))
                .send()
                .await
                .unwrap()
                .status(),
            200
        );
    }
    let res = client
        .get(format!("http://{addr}/auth/login"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers().get("x-ratelimit-limit").unwrap(), "2");

    // the generous api budget is untouched
    assert_eq!(
        client
            .get(format!("http://{addr}/api/items"))
            .send()
            .await
            .unwrap()
            .status(),
        200
    );
}
