//! Admin API integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

use funmagic_core::RateLimitConfig;

// ============================================================================
// Credits
// ============================================================================

#[tokio::test]
async fn adjust_credits_grants_and_debits() {
    let harness = TestHarness::new();
    let path = format!("/v1/admin/users/{}/credits", harness.test_user_id);

    let response = harness
        .server
        .post(&path)
        .add_header("authorization", TestHarness::admin_auth_header())
        .json(&json!({ "amount": 500, "description": "Support credit" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["userId"], harness.test_user_id.to_string());
    assert_eq!(body["credits"]["balance"], 500);
    assert_eq!(body["credits"]["lifetimePurchased"], 500);
    assert_eq!(body["transaction"]["type"], "bonus");
    assert_eq!(body["transaction"]["balanceAfter"], 500);

    let response = harness
        .server
        .post(&path)
        .add_header("authorization", TestHarness::admin_auth_header())
        .json(&json!({ "amount": -200, "description": "Chargeback" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits"]["balance"], 300);
    assert_eq!(body["credits"]["lifetimePurchased"], 500);
    assert_eq!(body["transaction"]["type"], "admin_debit");
    assert_eq!(body["transaction"]["amount"], -200);
}

#[tokio::test]
async fn adjust_credits_below_zero_is_rejected() {
    let harness = TestHarness::new();
    let path = format!("/v1/admin/users/{}/credits", harness.test_user_id);

    let response = harness
        .server
        .post(&path)
        .add_header("authorization", TestHarness::admin_auth_header())
        .json(&json!({ "amount": -1, "description": "Oops" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "credits_insufficient");
    assert_eq!(body["error"]["details"]["available"], 0);
    assert_eq!(body["error"]["details"]["required"], 1);

    // Nothing was written.
    let response = harness
        .server
        .get(&path)
        .add_header("authorization", TestHarness::admin_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits"], serde_json::Value::Null);
    assert_eq!(body["recentTransactions"], json!([]));
}

#[tokio::test]
async fn adjust_credits_validates_input() {
    let harness = TestHarness::new();
    let path = format!("/v1/admin/users/{}/credits", harness.test_user_id);

    for body in [
        json!({ "amount": 0, "description": "Nothing" }),
        json!({ "amount": 10, "description": "  " }),
    ] {
        let response = harness
            .server
            .post(&path)
            .add_header("authorization", TestHarness::admin_auth_header())
            .json(&body)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    let response = harness
        .server
        .post("/v1/admin/users/not-a-uuid/credits")
        .add_header("authorization", TestHarness::admin_auth_header())
        .json(&json!({ "amount": 10, "description": "Bonus" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_user_credits_shows_recent_transactions() {
    let harness = TestHarness::new();
    let path = format!("/v1/admin/users/{}/credits", harness.test_user_id);

    for i in 1..=12 {
        harness
            .server
            .post(&path)
            .add_header("authorization", TestHarness::admin_auth_header())
            .json(&json!({ "amount": i, "description": format!("grant {i}") }))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .get(&path)
        .add_header("authorization", TestHarness::admin_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["credits"]["balance"], 78);
    let recent = body["recentTransactions"].as_array().unwrap();
    assert_eq!(recent.len(), 10);
    assert_eq!(recent[0]["description"], "grant 12");
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let harness = TestHarness::new();
    let path = format!("/v1/admin/users/{}/credits", harness.test_user_id);

    let response = harness
        .server
        .post(&path)
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount": 1000, "description": "Free money" }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "forbidden");

    let response = harness.server.get(&path).await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Rate-limit settings
// ============================================================================

#[tokio::test]
async fn settings_default_until_updated() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/admin/settings/rate-limit")
        .add_header("authorization", TestHarness::admin_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["config"], serde_json::to_value(RateLimitConfig::default()).unwrap());
}

#[tokio::test]
async fn settings_update_roundtrips() {
    let harness = TestHarness::new();
    let mut config = RateLimitConfig::default();
    config.limits.user_api.max = 42;
    config.tiers.truncate(1);

    let response = harness
        .server
        .put("/v1/admin/settings/rate-limit")
        .add_header("authorization", TestHarness::admin_auth_header())
        .json(&json!({ "config": config }))
        .await;
    response.assert_status_ok();

    let response = harness
        .server
        .get("/v1/admin/settings/rate-limit")
        .add_header("authorization", TestHarness::admin_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["config"]["limits"]["userApi"]["max"], 42);
    assert_eq!(body["config"]["tiers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn settings_update_rejects_invalid_config() {
    let harness = TestHarness::new();
    let mut config = RateLimitConfig::default();
    config.tiers[0].multiplier = 0.0;

    let response = harness
        .server
        .put("/v1/admin/settings/rate-limit")
        .add_header("authorization", TestHarness::admin_auth_header())
        .json(&json!({ "config": config }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "validation_error");
}
