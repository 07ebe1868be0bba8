//! # msmt-datastore - On-device attribution datastore
//!
//! Transactional persistence layer for privacy-preserving ad-conversion
//! measurement.
//!
//! The crate provides:
//! - A URI/site matcher (scheme + eTLD+1 for web, scheme + host for apps)
//! - Typed measurement records: sources, triggers, reports, attributions
//! - A transaction manager that runs units of work all-or-nothing
//! - The attribution DAO: matching, rate-limit counters, install
//!   attribution, dedup bookkeeping, retention and deletion sweeps

pub mod site;
pub mod measurement;
pub mod storage;
pub mod config;

// Re-exports for convenient access
pub use site::{Site, SurfaceType};
pub use config::DatastoreConfig;
pub use storage::{DatastoreManager, MeasurementDao, MeasurementDb};

/// Result type alias for datastore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for datastore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A record could not be constructed from the supplied fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Get-by-id on a row that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The storage engine rejected a write (uniqueness, foreign key)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// The store is at or above its configured size ceiling
    #[error("Store capacity exceeded: {size} bytes (limit {limit})")]
    CapacityExceeded { size: u64, limit: u64 },

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, ref msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Constraint(msg.clone().unwrap_or_else(|| code.to_string()))
            }
            other => Error::Storage(other),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUri(err.to_string())
    }
}
