//! Convenience re-exports for common ConnHaus usage
//!
//! This prelude module re-exports the most commonly used items from the
//! ConnHaus workspace, making it easier to import everything you need with a
//! single use statement.
//!
//! # Example
//!
//! ```rust
//! use connhaus::prelude::*;
//!
//! let manager = ConnectionManager::new();
//! assert!(manager.is_empty());
//! ```

// Core ConnHaus components
pub use crate::core::ConnectionManager;
pub use crate::errors::{ConnHausError, TeardownFailure};
pub use crate::health::{AggregateHealthStatus, ConnectionHealth, HealthStatus};
pub use crate::record::{ConnectionRecord, DEFAULT_CONNECTION_NAME};
pub use crate::retry::RetryPolicy;
pub use crate::sanitize::sanitize_message;

// Re-export centralized config
pub use config::{AppConfig, ConnectionConfig, ConnectionOptions};

// Backend drivers
pub use driver_system::prelude::*;

// Lifecycle signals
pub use signal_system::prelude::*;

// Common external dependencies
pub use anyhow;
pub use tokio;
