//! HTTP Route Tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use topowatch::http_server::{HttpServer, HttpServerConfig};
use topowatch::topology::{MemberRole, Notifier, ReplicaSetDescription};

fn replica_set() -> ReplicaSetDescription {
    ReplicaSetDescription::member("rs0", "a:27017", MemberRole::Primary)
        .with_hosts(["a:27017", "b:27017"])
        .with_primary("a:27017")
}

fn app() -> (Router, Arc<Notifier<ReplicaSetDescription>>) {
    let notifier = Arc::new(Notifier::new(replica_set()));
    let router = HttpServer::with_config(HttpServerConfig::default(), Arc::clone(&notifier)).router();
    (router, notifier)
}

async fn post(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    post_raw(router, uri, body.to_string()).await
}

async fn post_raw(router: Router, uri: &str, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    send(router, request).await
}

async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, request).await
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn version_json(notifier: &Notifier<ReplicaSetDescription>) -> Value {
    let version = notifier.version();
    json!({
        "processId": {"$oid": version.process_id().to_hex()},
        "counter": {"$numberLong": version.counter().to_string()},
    })
}

// =============================================================================
// POST /hello
// =============================================================================

/// Plain hello returns the description, topologyVersion and ok.
#[tokio::test]
async fn test_hello_immediate() {
    let (router, notifier) = app();
    let (status, body) = post(router, "/hello", json!({"hello": 1})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], 1.0);
    assert_eq!(body["isWritablePrimary"], true);
    assert_eq!(body["setName"], "rs0");
    assert_eq!(body["topologyVersion"], version_json(&notifier));
}

/// Current version with a small budget times out with the same version.
#[tokio::test]
async fn test_hello_times_out() {
    let (router, notifier) = app();
    let request = json!({
        "hello": 1,
        "topologyVersion": version_json(&notifier),
        "maxAwaitTimeMS": 50,
    });

    let (status, body) = post(router, "/hello", request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topologyVersion"], version_json(&notifier));
}

/// Publishing through the route wakes a parked hello.
#[tokio::test]
async fn test_publish_wakes_hello() {
    let (router, notifier) = app();
    let request = json!({
        "hello": 1,
        "topologyVersion": version_json(&notifier),
        "maxAwaitTimeMS": 10_000,
    });

    let parked = tokio::spawn(post(router.clone(), "/hello", request));
    while notifier.pending_waiters() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let stepped_down = ReplicaSetDescription::member("rs0", "a:27017", MemberRole::Secondary)
        .with_hosts(["a:27017", "b:27017"])
        .with_primary("b:27017");
    let (status, published) = post(
        router,
        "/topology",
        serde_json::to_value(&stepped_down).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["topologyVersion"]["counter"]["$numberLong"], "1");

    let (status, body) = parked.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["secondary"], true);
    assert_eq!(body["primary"], "b:27017");
    assert_eq!(body["topologyVersion"], published["topologyVersion"]);
}

/// Validation failures use the command error shape.
#[tokio::test]
async fn test_hello_validation_error() {
    let (router, _) = app();
    let (status, body) = post(router, "/hello", json!({"hello": 1, "maxAwaitTimeMS": 10})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], 0.0);
    assert_eq!(body["code"], 31368);
    assert_eq!(body["codeName"], "PairingViolation");
}

/// Malformed Extended JSON is a parse failure.
#[tokio::test]
async fn test_hello_bad_extended_json() {
    let (router, _) = app();
    let request = json!({
        "topologyVersion": {"processId": {"$oid": "zz"}, "counter": {"$numberLong": "0"}},
        "maxAwaitTimeMS": 10,
    });

    let (status, body) = post(router, "/hello", request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["codeName"], "FailedToParse");
}

/// Repeated keys in the body survive parsing and fail validation.
#[tokio::test]
async fn test_hello_duplicate_field() {
    let (router, notifier) = app();
    let pid = notifier.process_id().to_hex();
    let body = format!(
        r#"{{"hello": 1, "topologyVersion": {{"processId": {{"$oid": "{pid}"}}, "counter": {{"$numberLong": "0"}}, "counter": {{"$numberLong": "0"}}}}, "maxAwaitTimeMS": 10}}"#
    );

    let (status, body) = post_raw(router, "/hello", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 40413);
    assert_eq!(body["codeName"], "DuplicateField");
}

/// A body that is not JSON at all is a parse failure.
#[tokio::test]
async fn test_hello_malformed_body() {
    let (router, _) = app();
    let (status, body) = post_raw(router, "/hello", "{hello".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 9);
}

/// The configured cap bounds any requested budget.
#[tokio::test]
async fn test_hello_budget_capped_by_config() {
    let notifier = Arc::new(Notifier::new(replica_set()));
    let config = HttpServerConfig {
        max_await_ms: 50,
        ..HttpServerConfig::default()
    };
    let router = HttpServer::with_config(config, Arc::clone(&notifier)).router();
    let request = json!({
        "topologyVersion": version_json(&notifier),
        "maxAwaitTimeMS": 600_000,
    });

    let (status, body) = tokio::time::timeout(Duration::from_secs(10), post(router, "/hello", request))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topologyVersion"], version_json(&notifier));
}

/// A client that goes away mid-wait leaves no waiter behind.
#[tokio::test]
async fn test_abandoned_hello_releases_waiter() {
    let (router, notifier) = app();
    let request = json!({
        "topologyVersion": version_json(&notifier),
        "maxAwaitTimeMS": {"$numberLong": i64::MAX.to_string()},
    });

    let parked = tokio::spawn(post(router, "/hello", request));
    while notifier.pending_waiters() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    parked.abort();
    assert!(parked.await.unwrap_err().is_cancelled());
    assert_eq!(notifier.pending_waiters(), 0);
}

/// After shutdown awaiting hellos get 503.
#[tokio::test]
async fn test_hello_after_shutdown() {
    let (router, notifier) = app();
    notifier.shutdown();

    let request = json!({
        "topologyVersion": version_json(&notifier),
        "maxAwaitTimeMS": 1000,
    });
    let (status, body) = post(router, "/hello", request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], 91);
}

// =============================================================================
// POST /topology
// =============================================================================

/// Inconsistent descriptions are rejected without publishing.
#[tokio::test]
async fn test_publish_rejects_inconsistent_description() {
    let (router, notifier) = app();
    let bad = json!({"setName": "rs0", "hosts": ["a:1"], "primary": "z:1", "me": "a:1", "role": "secondary"});

    let (status, body) = post(router, "/topology", bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["codeName"], "BadValue");
    assert_eq!(notifier.version().counter(), 0);
}

// =============================================================================
// Health & Metrics
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (router, notifier) = app();
    let (status, body) = get(router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["process_id"], notifier.process_id().to_hex());
    assert_eq!(body["counter"], 0);
}

#[tokio::test]
async fn test_metrics() {
    let (router, _) = app();
    let (_, _) = post(router.clone(), "/hello", json!({"hello": 1})).await;

    let (status, body) = get(router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["immediate_responses"], 1);
    assert_eq!(body["pending_waiters"], 0);
}
