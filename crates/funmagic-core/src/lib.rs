//! Core types and logic for the funmagic credits service.
//!
//! - **Identifiers**: `UserId`, `TaskId`, `TransactionId`
//! - **Credits**: `Credit`, `CreditTransaction`, `TransactionType`
//! - **Ledger**: `LedgerOperation`, `LedgerEntry`
//! - **Rate limits**: `RateLimitConfig`, `LimitCategory`
//! - **Uploads**: `UploadPolicy`, `Visibility`
//!
//! Nothing here performs I/O. Persistence lives in `funmagic-store`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod credits;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod rate_limit;
pub mod upload;

pub use credits::{Credit, CreditTransaction, Reference, ReferenceKind, TransactionType};
pub use error::{LedgerError, Result};
pub use ids::{IdError, TaskId, TransactionId, UserId};
pub use ledger::{CreditGrant, GrantKind, LedgerEntry, LedgerOperation};
pub use rate_limit::{
    ConfigError, LimitCategory, RateLimitConfig, RateLimitLimitEntry, RateLimitLimits,
    RateLimitSettings, RateLimitTier, ResolvedTier,
};
pub use upload::{
    is_owned_key, storage_key, Buckets, UploadError, UploadPolicy, UploadRequest, Visibility,
};
