//! Type definitions for signal system

use crate::event::ConnectionEvent;

/// Event callback type
pub type EventCallback = Box<dyn Fn(&ConnectionEvent) + Send + Sync>;
