//! Signal system for connection lifecycle notifications
//!
//! This crate lets applications subscribe to the events the connection
//! manager publishes: opens, retries, health transitions and closures.

pub mod event;
pub mod manager;
pub mod prelude;
pub mod types;

pub use event::{ConnectionEvent, EventType};
pub use manager::SignalManager;
pub use types::EventCallback;
