//! End-to-end tests of the policy chain over the real reqwest transport

use std::sync::Arc;
use std::time::{Duration, Instant};

use azmgmt_core::{
    ClientSecretCredential, Error, Method, OperationState, Pipeline, PipelineConfig, Request,
    StaticTokenCredential, ThrottleRegistry,
};
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("azmgmt_core=debug")
        .try_init();
}

fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.retry.backoff_ms = 10;
    config.throttling.safety_margin_ms = 0;
    config.polling.default_interval_secs = 0;
    config
}

fn pipeline(config: PipelineConfig) -> Pipeline {
    Pipeline::builder(Arc::new(StaticTokenCredential::new("test-token")))
        .config(config)
        .build()
        .unwrap()
}

fn get(server: &MockServer, path_and_query: &str) -> Request {
    Request::parse(Method::GET, &format!("{}{}", server.uri(), path_and_query)).unwrap()
}

// ---------------------------------------------------------------------------
// 1. Headers added by the chain
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bearer_token_and_user_agent_are_sent() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .and(header("authorization", "Bearer test-token"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let response = pipeline(fast_config())
        .send(get(&server, "/subscriptions"))
        .await
        .unwrap();
    assert!(response.is_success());
}

#[tokio::test]
async fn client_secret_credential_authenticates_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "issued-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tenants"))
        .and(header("authorization", "Bearer issued-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(2)
        .mount(&server)
        .await;

    let credential =
        ClientSecretCredential::new("tenant-1", "app", "secret").with_authority(server.uri());
    let pipeline = Pipeline::builder(Arc::new(credential))
        .config(fast_config())
        .build()
        .unwrap();

    pipeline.send(get(&server, "/tenants")).await.unwrap();
    pipeline.send(get(&server, "/tenants")).await.unwrap();
}

// ---------------------------------------------------------------------------
// 2. Retry and throttling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let value: serde_json::Value = pipeline(fast_config())
        .send_json(get(&server, "/flaky"))
        .await
        .unwrap();
    assert_eq!(value["ok"], true);
}

#[tokio::test]
async fn throttled_request_is_replayed_after_retry_after() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions/sub-1/resourcegroups"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "1")
                .set_body_json(json!({"error": {"code": "TooManyRequests", "message": "slow down"}})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscriptions/sub-1/resourcegroups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let registry = ThrottleRegistry::new();
    let pipeline = Pipeline::builder(Arc::new(StaticTokenCredential::new("t")))
        .config(fast_config())
        .throttle_registry(registry.clone())
        .build()
        .unwrap();

    let start = Instant::now();
    let response = pipeline
        .send(get(&server, "/subscriptions/sub-1/resourcegroups"))
        .await
        .unwrap();
    assert!(response.is_success());
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(!registry.is_backing_off("sub-1"));
}

#[tokio::test]
async fn throttle_wait_above_limit_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string(
            "Number of requests exceeded the limit. Please try again after '30' minutes.",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = fast_config();
    config.throttling.max_wait_secs = 60;
    let err = pipeline(config)
        .send(get(&server, "/subscriptions/sub-1/providers"))
        .await
        .unwrap_err();
    match err {
        Error::ThrottleWaitExceeded {
            scope, requested, ..
        } => {
            assert_eq!(scope, "sub-1");
            assert_eq!(requested, Duration::from_secs(1800));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// 3. Paging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_follows_next_links_lazily() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [{"n": 3}]})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"n": 1}, {"n": 2}],
            "nextLink": format!("{}/items?page=2", server.uri())
        })))
        .mount(&server)
        .await;

    #[derive(serde::Deserialize)]
    struct Item {
        n: u32,
    }

    let mut items = pipeline(fast_config())
        .list::<Item>(get(&server, "/items"))
        .await
        .unwrap();
    assert_eq!(items.next().await.unwrap().unwrap().n, 1);
    assert_eq!(items.next().await.unwrap().unwrap().n, 2);
    assert_eq!(items.pages_fetched(), 0);
    assert_eq!(items.next().await.unwrap().unwrap().n, 3);
    assert!(items.next().await.is_none());
    assert_eq!(items.pages_fetched(), 1);
}

// ---------------------------------------------------------------------------
// 4. Long-running operations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn async_operation_is_polled_to_completion() {
    init_tracing();
    let server = MockServer::start().await;
    let resource = "/subscriptions/sub-1/resourcegroups/rg-1";
    let operation = format!("{}/operations/op-1", server.uri());

    Mock::given(method("DELETE"))
        .and(path(resource))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("azure-asyncoperation", operation.as_str())
                .insert_header("retry-after", "0"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "InProgress"})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Succeeded"})))
        .mount(&server)
        .await;

    let request =
        Request::parse(Method::DELETE, &format!("{}{}", server.uri(), resource)).unwrap();
    let mut poller = pipeline(fast_config())
        .begin_long_running_operation(request)
        .await
        .unwrap();
    assert_eq!(poller.state(), OperationState::Started);

    assert_eq!(
        poller.poll_once().await.unwrap().state,
        OperationState::InProgress
    );
    assert_eq!(poller.wait().await.unwrap(), None);
}

#[tokio::test]
async fn failed_operation_surfaces_cloud_error() {
    let server = MockServer::start().await;
    let operation = format!("{}/operations/op-2", server.uri());
    Mock::given(method("PUT"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("azure-asyncoperation", operation.as_str())
                .set_body_json(json!({"properties": {"provisioningState": "Accepted"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/op-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Failed",
            "error": {"code": "SkuNotAvailable", "message": "no capacity"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::parse(
        Method::PUT,
        &format!("{}/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Foo/things/t", server.uri()),
    )
    .unwrap()
    .with_json(&json!({"location": "westus"}))
    .unwrap();
    let err = pipeline(fast_config())
        .begin_long_running_operation(request)
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert_eq!(err.cloud_error().unwrap().code, "SkuNotAvailable");
}
