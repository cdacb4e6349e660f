//! Presigned upload and download handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use funmagic_core::{is_owned_key, storage_key, UploadRequest};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::Presigner;

/// Presign response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    /// URL the client `PUT`s the file to, with the same `Content-Type`.
    pub upload_url: String,
    /// Object key to reference the file by afterwards.
    pub storage_key: String,
    /// Bucket the object lands in.
    pub bucket: String,
}

/// Query for a private download URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadQuery {
    /// Key returned by the presign call.
    pub storage_key: String,
}

/// Download URL response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    /// URL the client `GET`s the object from.
    pub download_url: String,
    /// Seconds until the URL stops working.
    pub expires_in: u64,
}

fn presigner(state: &AppState) -> Result<&Presigner, ApiError> {
    state.presigner.as_ref().ok_or(ApiError::StorageUnavailable)
}

/// Issue a presigned upload URL.
pub async fn presign(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<UploadRequest>,
) -> Result<Json<PresignResponse>, ApiError> {
    let visibility = state.config.upload_policy.check(&body).map_err(|e| {
        tracing::debug!(user_id = %auth.user_id, error = %e, "Upload request rejected");
        e
    })?;

    let presigner = presigner(&state)?;

    let now = chrono::Utc::now();
    let key = storage_key(&auth.user_id, &body.module, &body.filename, now.timestamp_millis());
    let bucket = presigner.buckets().for_visibility(visibility).to_string();
    let upload_url = presigner
        .presign_put(
            &bucket,
            &key,
            &body.content_type,
            body.content_length,
            Duration::from_secs(state.config.presign_expiry_seconds),
        )
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        bucket = %bucket,
        storage_key = %key,
        content_type = %body.content_type,
        content_length = ?body.content_length,
        "Presigned upload issued"
    );

    Ok(Json(PresignResponse {
        upload_url,
        storage_key: key,
        bucket,
    }))
}

/// Issue a presigned download URL for one of the caller's private objects.
pub async fn download_url(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<DownloadQuery>,
) -> Result<Json<DownloadResponse>, ApiError> {
    if query.storage_key.trim().is_empty() {
        return Err(ApiError::Validation("storageKey is required".into()));
    }
    if !is_owned_key(&auth.user_id, &query.storage_key) {
        tracing::warn!(
            user_id = %auth.user_id,
            storage_key = %query.storage_key,
            "Download of foreign object refused"
        );
        return Err(ApiError::Forbidden(
            "You do not have access to this asset".into(),
        ));
    }

    let presigner = presigner(&state)?;
    let expires_in = state.config.download_expiry_seconds;
    let download_url = presigner
        .presign_get(
            &presigner.buckets().private,
            &query.storage_key,
            Duration::from_secs(expires_in),
        )
        .await?;

    tracing::debug!(
        user_id = %auth.user_id,
        storage_key = %query.storage_key,
        "Presigned download issued"
    );

    Ok(Json(DownloadResponse {
        download_url,
        expires_in,
    }))
}
