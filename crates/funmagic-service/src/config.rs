//! Service configuration.

use serde::Deserialize;
use std::path::Path;

use funmagic_core::upload::{DEFAULT_ALLOWED_CONTENT_TYPES, DEFAULT_MAX_UPLOAD_BYTES};
use funmagic_core::{Buckets, UploadPolicy};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to the `RocksDB` data directory (default: "/data/funmagic").
    pub data_dir: String,

    /// Auth provider base URL; JWKS is fetched from `/.well-known/jwks.json`.
    pub auth_base_url: String,

    /// Expected JWT audience. Not checked when unset.
    pub auth_audience: Option<String>,

    /// Shared HS256 secret. When set, tokens are verified with it instead of JWKS.
    pub auth_jwt_secret: Option<String>,

    /// Service API key for the internal credits API.
    pub service_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Accepted upload types and size ceiling.
    pub upload_policy: UploadPolicy,

    /// Lifetime of presigned upload URLs in seconds (default: 900).
    pub presign_expiry_seconds: u64,

    /// Lifetime of presigned private download URLs in seconds (default: 3600).
    pub download_expiry_seconds: u64,

    /// Object storage. Upload and download URLs answer 503 when absent.
    pub storage: Option<StorageConfig>,
}

/// S3-compatible object storage settings.
#[derive(Clone)]
pub struct StorageConfig {
    /// Endpoint URL, e.g. `http://localhost:9000`. Buckets are addressed path-style.
    pub endpoint: String,
    /// Signing region.
    pub region: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Bucket names.
    pub buckets: Buckets,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("buckets", &self.buckets)
            .finish()
    }
}

/// Storage secrets file structure.
#[derive(Debug, Deserialize)]
struct StorageSecrets {
    endpoint: String,
    #[serde(default)]
    region: Option<String>,
    access_key: String,
    secret_key: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            auth_base_url: std::env::var("AUTH_BASE_URL").unwrap_or(defaults.auth_base_url),
            auth_audience: non_empty_var("AUTH_AUDIENCE"),
            auth_jwt_secret: non_empty_var("AUTH_JWT_SECRET"),
            service_api_key: non_empty_var("SERVICE_API_KEY"),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.cors_origins),
            max_body_bytes: parsed_var("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: parsed_var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            upload_policy: UploadPolicy {
                allowed_content_types: std::env::var("ALLOWED_UPLOAD_TYPES")
                    .map(|s| split_list(&s))
                    .unwrap_or(defaults.upload_policy.allowed_content_types),
                max_bytes: parsed_var("MAX_FILE_UPLOAD_SIZE").unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            },
            presign_expiry_seconds: parsed_var("PRESIGNED_URL_EXPIRATION_UPLOAD")
                .unwrap_or(defaults.presign_expiry_seconds),
            download_expiry_seconds: parsed_var("PRESIGNED_URL_EXPIRATION_PRIVATE")
                .unwrap_or(defaults.download_expiry_seconds),
            storage: load_storage_config(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn buckets_from_env() -> Buckets {
    Buckets {
        public: std::env::var("S3_BUCKET_PUBLIC").unwrap_or_else(|_| "funmagic-public".into()),
        private: std::env::var("S3_BUCKET_PRIVATE").unwrap_or_else(|_| "funmagic-private".into()),
        admin: std::env::var("S3_BUCKET_ADMIN").unwrap_or_else(|_| "funmagic-admin".into()),
    }
}

/// Load storage settings from a secrets file or the environment.
fn load_storage_config() -> Option<StorageConfig> {
    let secret_paths = [
        ".secrets/storage.json",
        "funmagic/.secrets/storage.json",
        "../.secrets/storage.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StorageSecrets>(path) {
            tracing::info!(path = %path, "Loaded storage secrets from file");
            return Some(StorageConfig {
                endpoint: secrets.endpoint,
                region: secrets.region.unwrap_or_else(|| "us-east-1".into()),
                access_key: secrets.access_key,
                secret_key: secrets.secret_key,
                buckets: buckets_from_env(),
            });
        }
    }

    tracing::debug!("Storage secrets file not found, using environment variables");
    let endpoint = non_empty_var("S3_ENDPOINT")?;
    let access_key = non_empty_var("S3_ACCESS_KEY")?;
    let secret_key = non_empty_var("S3_SECRET_KEY")?;

    Some(StorageConfig {
        endpoint,
        region: non_empty_var("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
        access_key,
        secret_key,
        buckets: buckets_from_env(),
    })
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/funmagic".into(),
            auth_base_url: "http://localhost:3002".into(),
            auth_audience: None,
            auth_jwt_secret: None,
            service_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            upload_policy: UploadPolicy {
                allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                    .iter()
                    .map(|t| (*t).to_string())
                    .collect(),
                max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            presign_expiry_seconds: 900,
            download_expiry_seconds: 3600,
            storage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empty_entries() {
        assert_eq!(
            split_list(" image/png, text/plain ,,"),
            vec!["image/png".to_string(), "text/plain".to_string()]
        );
    }

    #[test]
    fn storage_debug_redacts_secret() {
        let storage = StorageConfig {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            access_key: "minio".into(),
            secret_key: "hunter2".into(),
            buckets: buckets_from_env(),
        };
        let debug = format!("{storage:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("minio"));
    }

    #[test]
    fn defaults_match_upload_policy_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.upload_policy, UploadPolicy::default());
        assert_eq!(config.presign_expiry_seconds, 900);
        assert_eq!(config.download_expiry_seconds, 3600);
        assert!(config.storage.is_none());
    }
}
