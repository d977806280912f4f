//! Error types for the data-access core
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

use crate::validation::ValidationErrors;

// == Data Error Enum ==
/// Unified error type for repository, executor and session operations.
#[derive(Error, Debug)]
pub enum DataError {
    /// Entity or session does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// One or more field violations, always reported as a batch
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Missing user, or a destroyed/absent session
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Session is past its expiry
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Query failed after exhausting its retry budget
    #[error("Database error after {attempts} attempt(s): {source}")]
    Database {
        attempts: u32,
        #[source]
        source: Box<DataError>,
    },

    /// A single attempt exceeded its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Failure reported by the entity store or a connection
    #[error("Store error: {0}")]
    Store(String),

    /// Failure reported by the cache
    #[error("Cache error: {0}")]
    Cache(String),

    /// Cache payload or record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DataError {
    /// Returns the field violations when this is a validation failure.
    pub fn violations(&self) -> Option<&ValidationErrors> {
        match self {
            DataError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the data-access core.
pub type Result<T> = std::result::Result<T, DataError>;
