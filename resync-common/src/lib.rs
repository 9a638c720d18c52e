//! # resync Common Library
//!
//! Shared code for the resync sync engine and its tooling:
//! - Error type and result alias
//! - Bootstrap configuration loading (CLI / ENV / TOML / defaults)
//! - Database schema initialization and persisted row models
//! - Sync lifecycle event bus and SSE helpers
//! - Timestamp and UUID utilities

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
