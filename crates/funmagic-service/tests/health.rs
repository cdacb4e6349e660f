//! Health endpoint integration tests.

mod common;

use common::TestHarness;

#[tokio::test]
async fn health_check_returns_ok() {
    let harness = TestHarness::new();

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "funmagic");
}

#[tokio::test]
async fn responses_carry_request_id_and_security_headers() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/health")
        .add_header("x-request-id", "req-123")
        .await;

    let headers = response.headers();
    assert_eq!(headers["x-request-id"], "req-123");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
    assert!(headers.contains_key("permissions-policy"));
}

#[tokio::test]
async fn request_id_is_generated_when_absent() {
    let harness = TestHarness::new();

    let response = harness.server.get("/health").await;

    let id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&id).is_ok());
}
