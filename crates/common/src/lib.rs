//! Transient Common Library
//!
//! Shared code for the Transient recommendation services including:
//! - Configuration management
//! - Error types and HTTP error mapping
//! - Relational store access (users, posts, votes, followings)
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::{DbPool, Repository};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
