//! End-to-end tests: start real servers on ephemeral ports and drive them
//! over HTTP.

use std::net::SocketAddr;
use std::time::Duration;

use mirage_server::{Environment, MockServer, ServerOptions};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn environment(uuid: &str, extra: Value) -> Environment {
    let mut config = json!({
        "uuid": uuid,
        "name": uuid,
        "port": 0,
        "hostname": "127.0.0.1",
        "routes": [
            {
                "uuid": "r-user",
                "method": "get",
                "endpoint": "users/:id",
                "responses": [{ "uuid": "resp-user", "body": "{{urlParam 'id'}}" }]
            },
            {
                "uuid": "r-global",
                "method": "get",
                "endpoint": "global",
                "responses": [{ "uuid": "resp-global", "body": "{{getGlobalVar 'k'}}" }]
            },
            {
                "uuid": "r-disabled",
                "method": "get",
                "endpoint": "disabled",
                "responses": [{ "uuid": "resp-disabled", "body": "should not be served" }]
            },
            {
                "uuid": "r-hello",
                "method": "get",
                "endpoint": "hello",
                "responses": [{ "uuid": "resp-hello", "statusCode": 201, "body": "hello from upstream" }]
            },
            {
                "uuid": "r-events",
                "method": "get",
                "endpoint": "events",
                "type": "ws",
                "responses": [{ "uuid": "resp-events" }]
            }
        ]
    });
    if let (Some(config), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            config.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(config).unwrap()
}

async fn start(environment: Environment, options: ServerOptions) -> (MockServer, String) {
    let server = MockServer::new(environment, options);
    let addr: SocketAddr = server.start().await.expect("server failed to start");
    (server, format!("http://{addr}"))
}

async fn get_text(client: &Client, url: &str) -> (StatusCode, String) {
    let response = client.get(url).send().await.unwrap();
    let status = response.status();
    (status, response.text().await.unwrap())
}

async fn logs(client: &Client, base: &str, query: &str) -> Vec<Value> {
    client
        .get(format!("{base}/mockoon-admin/logs?{query}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_url_params_are_rendered() {
    let (server, base) = start(environment("env-params", json!({})), ServerOptions::default()).await;
    let client = Client::new();

    let (status, body) = get_text(&client, &format!("{base}/users/42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "42");

    server.stop();
}

#[tokio::test]
async fn test_unmatched_request_is_not_found() {
    let (server, base) = start(environment("env-404", json!({})), ServerOptions::default()).await;
    let client = Client::new();

    let (status, body) = get_text(&client, &format!("{base}/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Cannot GET /nowhere");

    let entries = logs(&client, &base, "limit=10").await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["response"]["statusCode"], 404);

    server.stop();
}

#[tokio::test]
async fn test_disabled_route_falls_through() {
    let options = ServerOptions {
        disabled_routes: vec!["r-disabled".to_string()],
        ..ServerOptions::default()
    };
    let (server, base) = start(environment("env-disabled", json!({})), options).await;
    let client = Client::new();

    let (status, body) = get_text(&client, &format!("{base}/disabled")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Cannot GET /disabled");

    server.stop();
}

#[tokio::test]
async fn test_log_is_bounded() {
    let options = ServerOptions {
        max_transaction_logs: 3,
        ..ServerOptions::default()
    };
    let (server, base) = start(environment("env-bound", json!({})), options).await;
    let client = Client::new();

    for i in 0..5 {
        get_text(&client, &format!("{base}/r{i}")).await;
    }

    let entries = logs(&client, &base, "limit=10").await;
    let paths: Vec<&str> = entries
        .iter()
        .filter_map(|e| e["request"]["urlPath"].as_str())
        .collect();
    assert_eq!(paths, vec!["/r2", "/r3", "/r4"]);

    server.stop();
}

#[tokio::test]
async fn test_logs_paging() {
    let (server, base) = start(environment("env-paging", json!({})), ServerOptions::default()).await;
    let client = Client::new();

    for i in 0..12 {
        get_text(&client, &format!("{base}/r{i}")).await;
    }

    let entries = logs(&client, &base, "page=2&limit=5").await;
    let paths: Vec<&str> = entries
        .iter()
        .filter_map(|e| e["request"]["urlPath"].as_str())
        .collect();
    assert_eq!(paths, vec!["/r5", "/r6", "/r7", "/r8", "/r9"]);

    // admin requests are never logged
    let purge = client
        .request(
            Method::from_bytes(b"PURGE").unwrap(),
            format!("{base}/mockoon-admin/logs"),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(purge.status(), StatusCode::OK);
    assert!(logs(&client, &base, "").await.is_empty());

    server.stop();
}

#[tokio::test]
async fn test_global_vars_via_admin() {
    let (server, base) = start(environment("env-globals", json!({})), ServerOptions::default()).await;
    let client = Client::new();
    let url = format!("{base}/mockoon-admin/global-vars");

    let response = client.post(&url).json(&json!({})).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(&url)
        .json(&json!({"key": "k", "value": "v"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Global variable 'k' has been set to 'v'");

    let (_, body) = get_text(&client, &format!("{base}/global")).await;
    assert_eq!(body, "v");

    let response = client
        .post(format!("{base}/mockoon-admin/state/purge"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let (_, body) = get_text(&client, &format!("{base}/global")).await;
    assert_eq!(body, "");

    server.stop();
}

#[tokio::test]
async fn test_admin_api_can_be_disabled() {
    let options = ServerOptions {
        enable_admin_api: false,
        ..ServerOptions::default()
    };
    let (server, base) = start(environment("env-no-admin", json!({})), options).await;
    let client = Client::new();

    let (status, body) = get_text(&client, &format!("{base}/mockoon-admin/logs")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Cannot GET /mockoon-admin/logs");

    server.stop();
}

#[tokio::test]
async fn test_proxy_fallback() {
    let (upstream, upstream_base) =
        start(environment("env-upstream", json!({})), ServerOptions::default()).await;

    let proxy_env = json!({
        "routes": [],
        "proxy": { "mode": "fallback", "host": upstream_base, "resHeaders": [{ "key": "x-proxied", "value": "yes" }] }
    });
    let (server, base) = start(environment("env-proxy", proxy_env), ServerOptions::default()).await;
    let client = Client::new();

    let response = client.get(format!("{base}/hello")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-proxied"], "yes");
    assert_eq!(response.text().await.unwrap(), "hello from upstream");

    let entries = logs(&client, &base, "").await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["proxied"], true);

    upstream.stop();
    server.stop();
}

#[tokio::test]
async fn test_proxy_error_is_bad_gateway() {
    let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_host = format!("http://{}", unused.local_addr().unwrap());
    drop(unused);

    let proxy_env = json!({ "routes": [], "proxy": { "mode": "always", "host": dead_host } });
    let (server, base) = start(environment("env-dead-proxy", proxy_env), ServerOptions::default()).await;
    let client = Client::new();

    let response = client.get(format!("{base}/anything")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    server.stop();
}

#[tokio::test]
async fn test_cors_preflight() {
    let (server, base) = start(
        environment("env-cors", json!({ "cors": true, "headers": [{ "key": "x-env", "value": "1" }] })),
        ServerOptions::default(),
    )
    .await;
    let client = Client::new();

    let response = client
        .request(Method::OPTIONS, format!("{base}/anything"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["x-env"], "1");

    server.stop();
}

#[tokio::test]
async fn test_streaming_route_replays_messages() {
    let (server, base) = start(environment("env-stream", json!({})), ServerOptions::default()).await;
    let client = Client::new();

    assert!(server.send_to_route("r-events", "first", true));
    assert!(server.send_to_route("r-events", "second", true));

    let mut response = client.get(format!("{base}/events")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let mut received = String::new();
    let read = timeout(TEST_TIMEOUT, async {
        while !received.contains("data: second") {
            match response.chunk().await.unwrap() {
                Some(chunk) => received.push_str(&String::from_utf8_lossy(&chunk)),
                None => break,
            }
        }
    })
    .await;
    assert!(read.is_ok(), "timed out waiting for replayed messages");

    let first = received.find("data: first").unwrap();
    let second = received.find("data: second").unwrap();
    assert!(first < second);

    server.stop();
}
