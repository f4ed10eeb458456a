//! Error types for backend driver operations
//!
//! This module defines all error types that can occur while resolving a
//! backend, opening a handle, probing it, or closing it.

use thiserror::Error;

use crate::kind::BackendKind;

/// Driver system errors
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Unsupported connection scheme: {0}")]
    UnsupportedScheme(String),

    #[error("{0} connections require an auth token")]
    MissingAuthToken(BackendKind),

    #[error("No opener registered for backend: {0}")]
    NoOpener(BackendKind),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl DriverError {
    /// Errors caused by the configuration itself; retrying cannot fix them.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DriverError::UnsupportedScheme(_)
                | DriverError::MissingAuthToken(_)
                | DriverError::NoOpener(_)
        )
    }
}
