//! Driver system for backend-specific connection handling
//!
//! This crate maps connection-string schemes to backend families and
//! provides the openers that turn a connection string into a live handle.

pub mod errors;
pub mod handle;
pub mod kind;
pub mod libsql;
pub mod prelude;
pub mod registry;
pub mod sqlx_driver;

pub use errors::DriverError;
pub use handle::{BackendHandle, BackendOpener, OpenRequest, SchemaHandle};
pub use kind::BackendKind;
pub use libsql::{LibSqlHandle, LibSqlOpener};
pub use registry::DriverRegistry;
pub use sqlx_driver::{SqlxHandle, SqlxOpener, SqlxPool};
