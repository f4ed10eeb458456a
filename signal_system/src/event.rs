//! Connection lifecycle event types
//!
//! This module defines the structure of events the connection manager
//! publishes as connections are opened, monitored and closed.

use driver_system::BackendKind;
use serde::{Deserialize, Serialize};

/// Connection lifecycle event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Opened,
    Reused,
    RetryScheduled,
    OpenFailed,
    HealthChanged,
    Closed,
    CloseFailed,
}

/// Connection lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvent {
    /// Event type
    pub event_type: EventType,
    /// Name the connection is registered under
    pub connection_name: String,
    /// Backend family, when known
    pub backend: Option<BackendKind>,
    /// Sanitized detail (error text, new status, retry delay)
    pub message: Option<String>,
    /// Event timestamp (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ConnectionEvent {
    pub fn new(event_type: EventType, connection_name: impl Into<String>) -> Self {
        Self {
            event_type,
            connection_name: connection_name.into(),
            backend: None,
            message: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
