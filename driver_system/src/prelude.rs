//! Convenience re-exports for common driver-system usage

// Core driver system components
pub use crate::errors::DriverError;
pub use crate::handle::{BackendHandle, BackendOpener, OpenRequest, SchemaHandle};
pub use crate::kind::BackendKind;
pub use crate::registry::DriverRegistry;
pub use crate::sqlx_driver::{SqlxHandle, SqlxPool};

// Common external dependencies
pub use async_trait::async_trait;
pub use sqlx;
