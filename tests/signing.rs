//! Signature verification over HTTP.

use std::sync::Arc;

use gatekeeper::clock::SystemClock;
use gatekeeper::config::schema::{DigestAlgorithm, GatewayConfig};
use gatekeeper::signing::RequestSigner;

mod common;

const KEY_ID: &str = "k1";
const SECRET: &[u8] = b"integration-secret";

fn config_on_port(port: u16) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = format!("127.0.0.1:{port}");
    config.observability.metrics_enabled = false;
    config.signing.required = true;
    config
        .signing
        .keys
        .insert(KEY_ID.to_string(), String::from_utf8_lossy(SECRET).to_string());
    config
}

fn signer() -> RequestSigner {
    RequestSigner::new(DigestAlgorithm::Sha256, 300, Arc::new(SystemClock::new()))
}

#[tokio::test]
async fn test_signed_get_round_trip() {
    let (addr, _shutdown) = common::start_gateway(config_on_port(28220)).await;
    let client = common::client();

    let host = addr.to_string();
    let headers = vec![("host".to_string(), host.clone())];
    let query = vec![
        ("b".to_string(), "2".to_string()),
        ("a".to_string(), "1".to_string()),
    ];
    let parts = signer()
        .sign(SECRET, "GET", "/api/items", &query, &headers, None, None, None)
        .unwrap();

    let res = client
        .get(format!("http://{addr}/api/items?b=2&a=1"))
        .header("x-signature", &parts.signature)
        .header("x-timestamp", parts.timestamp.to_string())
        .header("x-nonce", &parts.nonce)
        .header("x-key-id", KEY_ID)
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_signed_post_with_body_round_trip() {
    let (addr, _shutdown) = common::start_gateway(config_on_port(28221)).await;
    let client = common::client();

    let body = br#"{"item":"widget"}"#;
    let host = addr.to_string();
    let headers = vec![
        ("host".to_string(), host),
        ("content-type".to_string(), "application/json".to_string()),
        ("content-length".to_string(), body.len().to_string()),
    ];
    let parts = signer()
        .sign(SECRET, "POST", "/api/items", &[], &headers, Some(body), None, None)
        .unwrap();

    let res = client
        .post(format!("http://{addr}/api/items"))
        .header("content-type", "application/json")
        .header("x-signature", &parts.signature)
        .header("x-timestamp", parts.timestamp.to_string())
        .header("x-nonce", &parts.nonce)
        .header("x-key-id", KEY_ID)
        .body(body.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_tampered_body_rejected() {
    let (addr, _shutdown) = common::start_gateway(config_on_port(28222)).await;
    let client = common::client();

    let body = br#"{"amount":10}"#;
    let tampered = br#"{"amount":99}"#;
    let host = addr.to_string();
    let headers = vec![
        ("host".to_string(), host),
        ("content-type".to_string(), "application/json".to_string()),
        ("content-length".to_string(), tampered.len().to_string()),
    ];
    let parts = signer()
        .sign(SECRET, "POST", "/api/pay", &[], &headers, Some(body), None, None)
        .unwrap();

    let res = client
        .post(format!("http://{addr}/api/pay"))
        .header("content-type", "application/json")
        .header("x-signature", &parts.signature)
        .header("x-timestamp", parts.timestamp.to_string())
        .header("x-nonce", &parts.nonce)
        .header("x-key-id", KEY_ID)
        .body(tampered.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "signature_invalid");
}

#[tokio::test]
async fn test_replay_accepted_once_then_rejected() {
    let (addr, _shutdown) = common::start_gateway(config_on_port(28223)).await;
    let client = common::client();

    let host = addr.to_string();
    let headers = vec![("host".to_string(), host)];
    let parts = signer()
        .sign(SECRET, "GET", "/api/items", &[], &headers, None, None, None)
        .unwrap();

    let send = || {
        client
            .get(format!("http://{addr}/api/items"))
            .header("x-signature", &parts.signature)
            .header("x-timestamp", parts.timestamp.to_string())
            .header("x-nonce", &parts.nonce)
            .header("x-key-id", KEY_ID)
            .send()
    };

    assert_eq!(send().await.unwrap().status(), 200);

    let res = send().await.unwrap();
    assert_eq!(res.status(), 401);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "nonce_replay");
}

#[tokio::test]
async fn test_missing_headers_rejected() {
    let (addr, _shutdown) = common::start_gateway(config_on_port(28224)).await;
    let client = common::client();

    let res = client
        .get(format!("http://{addr}/api/items"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "signature_missing");
}

#[tokio::test]
async fn test_stale_timestamp_rejected() {
    let (addr, _shutdown) = common::start_gateway(config_on_port(28225)).await;
    let client = common::client();

    let host = addr.to_string();
    let headers = vec![("host".to_string(), host)];
    let stale = common::now_unix() - 301;
    let parts = signer()
        .sign(SECRET, "GET", "/api/items", &[], &headers, None, Some(stale), None)
        .unwrap();

    let res = client
        .get(format!("http://{addr}/api/items"))
        .header("x-signature", &parts.signature)
        .header("x-timestamp", parts.timestamp.to_string())
        .header("x-nonce", &parts.nonce)
        .header("x-key-id", KEY_ID)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "timestamp_out_of_window");
}

#[tokio::test]
async fn test_unknown_key_id_rejected() {
    let (addr, _shutdown) = common::start_gateway(config_on_port(28226)).await;
    let client = common::client();

    let host = addr.to_string();
    let headers = vec![("host".to_string(), host)];
    let parts = signer()
        .sign(SECRET, "GET", "/api/items", &[], &headers, None, None, None)
        .unwrap();

    let res = client
        .get(format!("http://{addr}/api/items"))
        .header("x-signature", &parts.signature)
        .header("x-timestamp", parts.timestamp.to_string())
        .header("x-nonce", &parts.nonce)
        .header("x-key-id", "who-is-this")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
}
