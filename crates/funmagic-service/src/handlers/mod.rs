//! API handlers.

pub mod admin;
pub mod credits;
pub mod health;
pub mod internal;
pub mod rate_limit;
pub mod upload;
