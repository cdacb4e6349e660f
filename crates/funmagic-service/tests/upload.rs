//! Presigned upload integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

fn signed_headers(url: &str) -> Vec<String> {
    let url = reqwest::Url::parse(url).unwrap();
    url.query_pairs()
        .find(|(name, _)| name == "X-Amz-SignedHeaders")
        .map(|(_, value)| value.split(';').map(str::to_string).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn presign_returns_signed_put_url() {
    let harness = TestHarness::with_storage();

    let response = harness
        .server
        .post("/v1/upload/presign")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({
            "module": "avatars",
            "filename": "my photo.png",
            "contentType": "image/png",
            "contentLength": 2048,
            "visibility": "public",
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["bucket"], "fm-public");

    let key = body["storageKey"].as_str().unwrap();
    let prefix = format!("{}/avatars/", harness.test_user_id);
    assert!(key.starts_with(&prefix));
    assert!(key.ends_with("_my_photo.png"));

    let url = body["uploadUrl"].as_str().unwrap();
    assert!(url.starts_with(&format!("http://localhost:9000/fm-public/{key}?")));
    assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
    assert!(url.contains("X-Amz-Expires=900"));
    assert!(url.contains("X-Amz-Signature="));

    let signed = signed_headers(url);
    assert!(signed.contains(&"content-type".to_string()));
    assert!(signed.contains(&"content-length".to_string()));
}

#[tokio::test]
async fn presign_defaults_to_private_bucket() {
    let harness = TestHarness::with_storage();

    let response = harness
        .server
        .post("/v1/upload/presign")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({
            "module": "tools",
            "filename": "input.json",
            "contentType": "application/json",
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["bucket"], "fm-private");
}

#[tokio::test]
async fn presign_rejects_disallowed_requests() {
    let harness = TestHarness::with_storage();

    for request in [
        json!({ "module": "tools", "filename": "run.exe", "contentType": "application/x-msdownload" }),
        json!({ "module": "", "filename": "a.png", "contentType": "image/png" }),
        json!({ "module": "tools", "filename": "a.png", "contentType": "image/png", "contentLength": 100_000_000 }),
        json!({ "module": "tools", "filename": "a.png", "contentType": "image/png", "visibility": "admin-private" }),
    ] {
        let response = harness
            .server
            .post("/v1/upload/presign")
            .add_header("authorization", harness.user_auth_header())
            .json(&request)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "validation_error");
    }
}

#[tokio::test]
async fn presign_without_storage_is_unavailable() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/upload/presign")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({
            "module": "tools",
            "filename": "a.png",
            "contentType": "image/png",
        }))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "storage_unavailable");
}

#[tokio::test]
async fn presign_requires_auth() {
    let harness = TestHarness::with_storage();

    let response = harness
        .server
        .post("/v1/upload/presign")
        .json(&json!({
            "module": "tools",
            "filename": "a.png",
            "contentType": "image/png",
        }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn download_url_is_issued_for_own_private_object() {
    let harness = TestHarness::with_storage();
    let key = format!("{}/tools/1700000000000_input.json", harness.test_user_id);

    let response = harness
        .server
        .get("/v1/upload/download-url")
        .add_query_param("storageKey", &key)
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["expiresIn"], 3600);

    let url = body["downloadUrl"].as_str().unwrap();
    assert!(url.starts_with(&format!("http://localhost:9000/fm-private/{key}?")));
    assert!(url.contains("X-Amz-Expires=3600"));
    assert!(!signed_headers(url).contains(&"content-length".to_string()));
}

#[tokio::test]
async fn download_url_refuses_other_users_objects() {
    let harness = TestHarness::with_storage();

    for key in [
        format!("{}/tools/1_a.png", funmagic_core::UserId::generate()),
        format!("{}/../someone/tools/1_a.png", harness.test_user_id),
        "tools/1_a.png".to_string(),
    ] {
        let response = harness
            .server
            .get("/v1/upload/download-url")
            .add_query_param("storageKey", &key)
            .add_header("authorization", harness.user_auth_header())
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "forbidden");
    }
}

#[tokio::test]
async fn download_url_requires_auth_and_storage() {
    let harness = TestHarness::with_storage();
    let key = format!("{}/tools/1_a.png", harness.test_user_id);

    harness
        .server
        .get("/v1/upload/download-url")
        .add_query_param("storageKey", &key)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let harness = TestHarness::new();
    let key = format!("{}/tools/1_a.png", harness.test_user_id);
    let response = harness
        .server
        .get("/v1/upload/download-url")
        .add_query_param("storageKey", &key)
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
