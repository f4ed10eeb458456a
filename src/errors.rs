//! Error types for the ConnHaus crate
//!
//! This module contains all error types that can be returned by connection
//! manager operations. Every message carried here has already been passed
//! through [`crate::sanitize::sanitize_message`].

use config::ConfigError;
use driver_system::DriverError;
use thiserror::Error;

use crate::sanitize::sanitize_message;

/// A teardown that failed during `close_all`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub name: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ConnHausError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transient connection error: {0}")]
    Transient(String),

    #[error("Failed to establish connection after {attempts} attempts: {last_error}")]
    ExhaustedRetries { attempts: u32, last_error: String },

    #[error("Connection '{name}' is unhealthy: {}", last_error.as_deref().unwrap_or("no error recorded"))]
    Unhealthy {
        name: String,
        last_error: Option<String>,
    },

    #[error("Connection not found: {0}")]
    NotFound(String),

    #[error("Failed to close connection '{name}': {message}")]
    Teardown { name: String, message: String },

    #[error("Failed to close {} connection(s): {}", failures.len(), describe_failures(failures))]
    CloseAll { failures: Vec<TeardownFailure> },

    #[error("Config error: {0}")]
    Config(String),
}

impl ConnHausError {
    pub fn configuration(message: impl AsRef<str>) -> Self {
        ConnHausError::Configuration(sanitize_message(message.as_ref()))
    }

    pub fn transient(message: impl AsRef<str>) -> Self {
        ConnHausError::Transient(sanitize_message(message.as_ref()))
    }

    pub fn exhausted(attempts: u32, last_error: impl AsRef<str>) -> Self {
        ConnHausError::ExhaustedRetries {
            attempts,
            last_error: sanitize_message(last_error.as_ref()),
        }
    }

    pub fn teardown(name: &str, message: impl AsRef<str>) -> Self {
        ConnHausError::Teardown {
            name: name.to_string(),
            message: sanitize_message(message.as_ref()),
        }
    }

    /// Only transient failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnHausError::Transient(_))
    }
}

impl From<DriverError> for ConnHausError {
    fn from(error: DriverError) -> Self {
        if error.is_configuration() {
            ConnHausError::configuration(error.to_string())
        } else {
            ConnHausError::transient(error.to_string())
        }
    }
}

impl From<ConfigError> for ConnHausError {
    fn from(error: ConfigError) -> Self {
        ConnHausError::Config(sanitize_message(&error.to_string()))
    }
}

fn describe_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{} ({})", failure.name, failure.message))
        .collect::<Vec<_>>()
        .join(", ")
}
