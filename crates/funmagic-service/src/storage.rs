//! Presigned object storage URLs.
//!
//! Only URL signing lives here; the service never transfers objects itself.
//! Buckets are addressed path-style (`{endpoint}/{bucket}/{key}`), which S3
//! and MinIO both accept.

use std::time::Duration;

use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;

use funmagic_core::Buckets;

use crate::config::StorageConfig;

/// Errors building a presigner or signing a URL.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The endpoint is not an absolute http(s) URL.
    #[error("invalid storage endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// Configured endpoint.
        endpoint: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The SDK refused to sign the request.
    #[error("failed to presign request: {0}")]
    Presign(String),
}

/// Signs upload and download URLs for the configured endpoint.
#[derive(Debug, Clone)]
pub struct Presigner {
    client: aws_sdk_s3::Client,
    buckets: Buckets,
}

impl Presigner {
    /// Build a presigner from storage settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not an absolute http(s) URL.
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        let invalid = |reason: &str| StorageError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: reason.to_string(),
        };

        let url = reqwest::Url::parse(&config.endpoint).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host"));
        }

        let credentials = Credentials::new(
            config.access_key,
            config.secret_key,
            None,
            None,
            "funmagic-storage",
        );
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .endpoint_url(config.endpoint.trim_end_matches('/'))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            buckets: config.buckets,
        })
    }

    /// Bucket names.
    #[must_use]
    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    /// A URL that lets its holder `PUT` one object.
    ///
    /// The upload must carry the same `Content-Type`, and the same
    /// `Content-Length` when one is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the expiry is out of range or signing fails.
    pub async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        content_length: Option<u64>,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let content_length = content_length
            .map(|len| {
                i64::try_from(len)
                    .map_err(|_| StorageError::Presign(format!("content length {len} too large")))
            })
            .transpose()?;

        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .set_content_length(content_length)
            .presigned(presigning_config(expires_in)?)
            .await
            .map_err(|e| StorageError::Presign(DisplayErrorContext(&e).to_string()))?;

        Ok(request.uri().to_string())
    }

    /// A URL that lets its holder `GET` one object.
    ///
    /// # Errors
    ///
    /// Returns an error if the expiry is out of range or signing fails.
    pub async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config(expires_in)?)
            .await
            .map_err(|e| StorageError::Presign(DisplayErrorContext(&e).to_string()))?;

        Ok(request.uri().to_string())
    }
}

fn presigning_config(expires_in: Duration) -> Result<PresigningConfig, StorageError> {
    PresigningConfig::expires_in(expires_in).map_err(|e| StorageError::Presign(e.to_string()))
}
