//! Connection records
//!
//! A record is the manager's unit of state for one named connection: the
//! open backend handle, the configuration it was opened with, and its
//! rolling health.

use chrono::{DateTime, Utc};
use config::ConnectionConfig;
use driver_system::{BackendHandle, BackendKind, DriverError};
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::health::{ConnectionHealth, HealthStatus};

/// Name used when the caller does not pick one
pub const DEFAULT_CONNECTION_NAME: &str = "default";

pub struct ConnectionRecord {
    /// Unique per open; a replaced record never shares its id
    id: Uuid,
    name: String,
    kind: BackendKind,
    handle: Arc<dyn BackendHandle>,
    config: ConnectionConfig,
    health: RwLock<ConnectionHealth>,
    /// Held from reading the previous health until the probe result is stored
    probing: tokio::sync::Mutex<()>,
    created_at: DateTime<Utc>,
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("health", &self.health())
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl ConnectionRecord {
    pub(crate) fn new(
        name: &str,
        kind: BackendKind,
        handle: Arc<dyn BackendHandle>,
        config: ConnectionConfig,
        health: ConnectionHealth,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            handle,
            config,
            health: RwLock::new(health),
            probing: tokio::sync::Mutex::new(()),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// The open backend handle, free to use for queries
    pub fn handle(&self) -> &Arc<dyn BackendHandle> {
        &self.handle
    }

    /// Concrete handle type, e.g. [`driver_system::SqlxHandle`]
    pub fn downcast_handle<T: 'static>(&self) -> Option<&T> {
        self.handle.as_any().downcast_ref::<T>()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Snapshot of the current health
    pub fn health(&self) -> ConnectionHealth {
        self.health
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn status(&self) -> HealthStatus {
        self.health
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .status
    }

    pub fn is_healthy(&self) -> bool {
        self.status().is_healthy()
    }

    /// Install a new health snapshot, returning the previous one
    pub(crate) fn replace_health(&self, health: ConnectionHealth) -> ConnectionHealth {
        let mut current = self
            .health
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *current, health)
    }

    /// Serializes probe-and-store so overlapping probes never lose a failure
    pub(crate) async fn lock_probing(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.probing.lock().await
    }

    pub(crate) async fn teardown(&self) -> Result<(), DriverError> {
        self.handle.close().await
    }
}
