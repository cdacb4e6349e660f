//! Internal (service-to-service) credits API integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

use funmagic_core::TaskId;

async fn grant(harness: &TestHarness, amount: i64) -> serde_json::Value {
    let response = harness
        .server
        .post("/v1/internal/credits/grant")
        .add_header("x-api-key", harness.service_api_key.clone())
        .add_header("x-service-name", "payments")
        .json(&json!({
            "userId": harness.test_user_id,
            "amount": amount,
            "kind": "purchase",
            "description": "Starter pack",
        }))
        .await;
    response.assert_status_ok();
    response.json()
}

fn task_body(harness: &TestHarness, task_id: TaskId, amount: i64) -> serde_json::Value {
    json!({
        "userId": harness.test_user_id,
        "taskId": task_id,
        "amount": amount,
    })
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn internal_routes_require_service_key() {
    let harness = TestHarness::new();
    let body = task_body(&harness, TaskId::generate(), 10);

    let response = harness
        .server
        .post("/v1/internal/credits/reserve")
        .json(&body)
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = harness
        .server
        .post("/v1/internal/credits/reserve")
        .add_header("x-api-key", "wrong-key")
        .json(&body)
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    // A user session is not a service credential.
    let response = harness
        .server
        .post("/v1/internal/credits/reserve")
        .add_header("authorization", harness.user_auth_header())
        .json(&body)
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Grants
// ============================================================================

#[tokio::test]
async fn purchase_grant_updates_lifetime_purchased() {
    let harness = TestHarness::new();

    let body = grant(&harness, 1000).await;

    assert_eq!(body["credits"]["balance"], 1000);
    assert_eq!(body["credits"]["lifetimePurchased"], 1000);
    assert_eq!(body["transaction"]["type"], "purchase");
    assert_eq!(body["transaction"]["description"], "Starter pack");
}

#[tokio::test]
async fn grant_with_idempotency_key_applies_once() {
    let harness = TestHarness::new();
    let request = json!({
        "userId": harness.test_user_id,
        "amount": 100,
        "kind": "purchase",
        "idempotencyKey": "payment-123",
        "referenceType": "payment",
    });

    harness
        .server
        .post("/v1/internal/credits/grant")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&request)
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post("/v1/internal/credits/grant")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&request)
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "duplicate_idempotency_key");

    let response = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["balance"], 100);
}

#[tokio::test]
async fn grant_rejects_non_positive_amount() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/internal/credits/grant")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "userId": harness.test_user_id,
            "amount": 0,
            "kind": "bonus",
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

// ============================================================================
// Task lifecycle
// ============================================================================

#[tokio::test]
async fn reserve_then_confirm_charges_once() {
    let harness = TestHarness::new();
    grant(&harness, 100).await;
    let task_id = TaskId::generate();
    let body = task_body(&harness, task_id, 30);

    let response = harness
        .server
        .post("/v1/internal/credits/reserve")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&body)
        .await;
    response.assert_status_ok();
    let reserved: serde_json::Value = response.json();
    assert_eq!(reserved["credits"]["balance"], 100);
    assert_eq!(reserved["credits"]["reservedBalance"], 30);
    assert_eq!(reserved["credits"]["availableBalance"], 70);
    assert_eq!(reserved["transaction"]["type"], "reservation");
    assert_eq!(reserved["transaction"]["referenceType"], "task");
    assert_eq!(reserved["transaction"]["referenceId"], task_id.to_string());

    let response = harness
        .server
        .post("/v1/internal/credits/confirm")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&body)
        .await;
    response.assert_status_ok();
    let confirmed: serde_json::Value = response.json();
    assert_eq!(confirmed["credits"]["balance"], 70);
    assert_eq!(confirmed["credits"]["reservedBalance"], 0);
    assert_eq!(confirmed["credits"]["lifetimeUsed"], 30);
    assert_eq!(confirmed["transaction"]["type"], "usage");

    // Retried confirmation is refused.
    let response = harness
        .server
        .post("/v1/internal/credits/confirm")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&body)
        .await;
    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn reserve_then_release_restores_available() {
    let harness = TestHarness::new();
    grant(&harness, 50).await;
    let task_id = TaskId::generate();

    harness
        .server
        .post("/v1/internal/credits/reserve")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&task_body(&harness, task_id, 50))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post("/v1/internal/credits/release")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "userId": harness.test_user_id,
            "taskId": task_id,
            "amount": 50,
            "reason": "Provider timeout",
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits"]["balance"], 50);
    assert_eq!(body["credits"]["availableBalance"], 50);
    assert_eq!(body["credits"]["reservedBalance"], 0);
    assert_eq!(body["transaction"]["type"], "release");
}

#[tokio::test]
async fn reserve_more_than_available_fails() {
    let harness = TestHarness::new();
    grant(&harness, 20).await;

    let response = harness
        .server
        .post("/v1/internal/credits/reserve")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&task_body(&harness, TaskId::generate(), 21))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "credits_insufficient");
    assert_eq!(body["error"]["details"]["available"], 20);
    assert_eq!(body["error"]["details"]["required"], 21);
}

#[tokio::test]
async fn confirm_without_reservation_fails() {
    let harness = TestHarness::new();
    grant(&harness, 100).await;

    let response = harness
        .server
        .post("/v1/internal/credits/confirm")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&task_body(&harness, TaskId::generate(), 10))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "credits_reserved_insufficient");
}
