//! Common test utilities for funmagic integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};

use funmagic_core::{Buckets, UserId};
use funmagic_service::auth::{JwtClaims, Role};
use funmagic_service::{create_router, AppState, ServiceConfig, StorageConfig};
use funmagic_store::{MemoryStore, Store};

/// Secret the harness signs session tokens with.
pub const JWT_SECRET: &str = "test-jwt-secret";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server, for seeding and inspection.
    pub store: Arc<MemoryStore>,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh store and no object storage.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness with object storage configured.
    pub fn with_storage() -> Self {
        Self::with_config(|config| {
            config.storage = Some(StorageConfig {
                endpoint: "http://localhost:9000".into(),
                region: "us-east-1".into(),
                access_key: "test-access-key".into(),
                secret_key: "test-secret-key".into(),
                buckets: Buckets {
                    public: "fm-public".into(),
                    private: "fm-private".into(),
                    admin: "fm-admin".into(),
                },
            });
        })
    }

    /// Create a harness after adjusting the default test configuration.
    pub fn with_config(customize: impl FnOnce(&mut ServiceConfig)) -> Self {
        let service_api_key = "test-service-key".to_string();

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            auth_base_url: "http://localhost".into(),
            auth_jwt_secret: Some(JWT_SECRET.into()),
            service_api_key: Some(service_api_key.clone()),
            ..ServiceConfig::default()
        };
        customize(&mut config);

        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone() as Arc<dyn Store>, config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            test_user_id: UserId::generate(),
            service_api_key,
        }
    }

    /// Get the authorization header for the test user.
    pub fn user_auth_header(&self) -> String {
        bearer(&self.test_user_id, Role::User)
    }

    /// Get an admin's authorization header.
    pub fn admin_auth_header() -> String {
        bearer(&UserId::generate(), Role::Admin)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        bearer(&UserId::generate(), Role::User)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign a session token for `user_id` with `role`.
pub fn token(user_id: &UserId, role: Role) -> String {
    let claims = JwtClaims {
        sub: user_id.to_string(),
        role,
        exp: chrono::Utc::now().timestamp() + 3600,
        iat: Some(chrono::Utc::now().timestamp()),
        iss: None,
        aud: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign test token")
}

/// `Bearer` header value for `user_id` with `role`.
pub fn bearer(user_id: &UserId, role: Role) -> String {
    format!("Bearer {}", token(user_id, role))
}
