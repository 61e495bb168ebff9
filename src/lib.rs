//! # soradb
//!
//! A small facade over the official MongoDB driver: connect, insert, find,
//! update, delete, sort and count against one current collection.
//!
//! Each method forwards to the driver's matching call and reports faults as a
//! single [`SoraError`] type. Query planning, pooling, retries and timeouts
//! stay with the driver.

pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod logging;
pub mod version;

pub use client::SoraDb;
pub use config::{ConnectionOptions, SoraConfig};
pub use document::{SortDirection, SortSpec};
pub use error::{Result, SoraError};
pub use version::VersionInfo;

/// Re-exported so callers can build documents without a direct `bson` dependency
pub use mongodb::bson;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SoraError::Validation("test".to_string());
        assert!(err.to_string().contains("test"));
    }
}
