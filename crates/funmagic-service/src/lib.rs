//! Funmagic HTTP API Service.
//!
//! This crate provides the HTTP API for the funmagic platform's shared
//! services:
//!
//! - Credit balance and transaction history
//! - Admin credit adjustments
//! - Task credit reservation, confirmation and release
//! - Tiered rate limiting with admin-editable configuration
//! - Presigned object storage uploads
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **Session JWTs** - For end-user and admin requests
//! 2. **Service API keys** - For service-to-service requests (task runner, payments)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router even when they never await

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod storage;

pub use config::{ServiceConfig, StorageConfig};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use storage::Presigner;
