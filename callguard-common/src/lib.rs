//! # CallGuard Common Library
//!
//! Shared code for CallGuard services:
//! - Error type used across crates
//! - Configuration loading and root folder resolution
//! - Event types and the broadcast `EventBus`
//! - SQLite pool initialization

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
