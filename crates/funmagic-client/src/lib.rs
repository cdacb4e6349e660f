//! Funmagic Client SDK.
//!
//! This crate provides a client library for services and front ends to talk to
//! the funmagic credits API.
//!
//! # Example
//!
//! ```no_run
//! use funmagic_client::{FunmagicClient, TaskCreditsRequest};
//! use funmagic_core::{TaskId, UserId};
//!
//! # async fn example() -> Result<(), funmagic_client::ClientError> {
//! let client = FunmagicClient::new("http://funmagic:8080", "your-service-api-key")?;
//!
//! let request = TaskCreditsRequest {
//!     user_id: UserId::generate(),
//!     task_id: TaskId::generate(),
//!     amount: 25,
//!     description: None,
//! };
//!
//! // Hold credits while the task runs, then charge them.
//! client.reserve_credits(&request).await?;
//! let result = client.confirm_credits(&request).await?;
//!
//! println!("New balance: {} credits", result.credits.balance);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, FunmagicClient};
pub use error::ClientError;
pub use types::*;
