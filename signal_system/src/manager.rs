use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::event::ConnectionEvent;
use crate::types::EventCallback;

/// Signal manager for connection lifecycle notifications
pub struct SignalManager {
    callbacks: std::sync::RwLock<Vec<EventCallback>>,
}

impl std::fmt::Debug for SignalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalManager")
            .field("callback_count", &self.callback_count())
            .finish()
    }
}

impl SignalManager {
    pub fn new() -> Self {
        Self {
            callbacks: std::sync::RwLock::new(Vec::new()),
        }
    }

    /// Add event callback
    pub fn add_callback<F>(&self, callback: F)
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        if let Ok(mut callbacks) = self.callbacks.write() {
            callbacks.push(Box::new(callback));
        }
    }

    /// Emit event to all subscribers. A panicking subscriber is logged and skipped.
    pub fn emit(&self, event: ConnectionEvent) {
        if let Ok(callbacks) = self.callbacks.read() {
            for (index, callback) in callbacks.iter().enumerate() {
                if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                    tracing::warn!(
                        callback = index,
                        event = ?event.event_type,
                        connection = %event.connection_name,
                        "connection event callback panicked"
                    );
                }
            }
        }
    }

    /// Clear all callbacks
    pub fn clear_callbacks(&self) {
        if let Ok(mut callbacks) = self.callbacks.write() {
            callbacks.clear();
        }
    }

    /// Get number of registered callbacks
    pub fn callback_count(&self) -> usize {
        self.callbacks.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for SignalManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_emit_reaches_every_callback() {
        let manager = SignalManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let seen = seen.clone();
            manager.add_callback(move |event| {
                seen.lock().unwrap().push(event.event_type);
            });
        }
        assert_eq!(manager.callback_count(), 2);

        manager.emit(ConnectionEvent::new(EventType::Opened, "default"));
        assert_eq!(*seen.lock().unwrap(), vec![EventType::Opened, EventType::Opened]);

        manager.clear_callbacks();
        assert_eq!(manager.callback_count(), 0);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_emission() {
        let manager = SignalManager::new();
        let seen = Arc::new(Mutex::new(0));

        manager.add_callback(|_| panic!("subscriber bug"));
        let counter = seen.clone();
        manager.add_callback(move |_| {
            *counter.lock().unwrap() += 1;
        });

        manager.emit(ConnectionEvent::new(EventType::Closed, "analytics"));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = ConnectionEvent::new(EventType::HealthChanged, "default")
            .with_backend(driver_system::BackendKind::Postgres)
            .with_message("degraded");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event_type"], "health_changed");
        assert_eq!(json["backend"], "postgres");
        assert_eq!(json["message"], "degraded");
    }
}
