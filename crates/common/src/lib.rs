//! Audience Forge Common Library
//!
//! Shared code for the Audience Forge services including:
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability
//! - Search index clients
//! - Candidate extraction clients

pub mod config;
pub mod errors;
pub mod extraction;
pub mod index;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use extraction::{Extractor, TermRole};
pub use index::{SearchIndex, ValueCount};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
