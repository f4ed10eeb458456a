//! Core ConnHaus functionality
//!
//! This module contains the [`ConnectionManager`], the single source of truth
//! for named connections: it opens them with retry, monitors their health on
//! a timer, hands them out, and tears them down.
//!
//! Operations on the same name are serialized by a per-name async lock, so
//! at most one `initialize` or `close_connection` is in flight per name and
//! no opened handle is ever left uninstalled.

use config::{AppConfig, ConnectionConfig};
use driver_system::{
    BackendHandle, BackendKind, BackendOpener, DriverRegistry, OpenRequest, SchemaHandle,
};
use futures::future::join_all;
use signal_system::{ConnectionEvent, EventType, SignalManager};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::errors::{ConnHausError, TeardownFailure};
use crate::health::{AggregateHealthStatus, ConnectionHealth, HealthProber, HealthStatus};
use crate::record::{ConnectionRecord, DEFAULT_CONNECTION_NAME};
use crate::retry::{RetryPolicy, RetryState};
use crate::sanitize::sanitize_message;

struct RegisteredConnection {
    record: Arc<ConnectionRecord>,
    /// Cancels the periodic health check for this record
    monitor: CancellationToken,
}

/// Manages named database connections
pub struct ConnectionManager {
    drivers: DriverRegistry,
    schema: Option<SchemaHandle>,
    signals: Arc<SignalManager>,
    connections: RwLock<HashMap<String, RegisteredConnection>>,
    name_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.connection_names())
            .field("drivers", &self.drivers)
            .field("signals", &self.signals)
            .finish()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let connections = self
            .connections
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for entry in connections.values() {
            entry.monitor.cancel();
        }
    }
}

impl ConnectionManager {
    /// Manager with the built-in backend openers
    pub fn new() -> Self {
        Self::with_drivers(DriverRegistry::with_defaults())
    }

    /// Manager using a custom opener table
    pub fn with_drivers(drivers: DriverRegistry) -> Self {
        Self {
            drivers,
            schema: None,
            signals: Arc::new(SignalManager::new()),
            connections: RwLock::new(HashMap::new()),
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Schema value passed through to every opener
    pub fn with_schema(mut self, schema: SchemaHandle) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Share a signal manager with the rest of the application
    pub fn with_signals(mut self, signals: Arc<SignalManager>) -> Self {
        self.signals = signals;
        self
    }

    pub fn signals(&self) -> &Arc<SignalManager> {
        &self.signals
    }

    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    /// Open (or reuse) the connection registered under `name`.
    ///
    /// A healthy record already registered under `name` is returned as is,
    /// even when `config` differs from the one it was opened with. Any other
    /// existing record is torn down and replaced by a freshly opened one.
    pub async fn initialize(
        &self,
        name: &str,
        config: ConnectionConfig,
    ) -> Result<Arc<ConnectionRecord>, ConnHausError> {
        config
            .validate()
            .map_err(|e| ConnHausError::configuration(e.to_string()))?;
        let kind = BackendKind::resolve(&config.url, config.auth_token.as_deref())?;
        let opener = self.drivers.opener(kind)?;

        let lock = self.name_lock(name);
        let result = {
            let _guard = lock.lock().await;
            self.open_or_reuse(name, kind, opener.as_ref(), config).await
        };
        if result.is_err() {
            drop(lock);
            self.release_name_lock(name);
        }
        result
    }

    async fn open_or_reuse(
        &self,
        name: &str,
        kind: BackendKind,
        opener: &dyn BackendOpener,
        config: ConnectionConfig,
    ) -> Result<Arc<ConnectionRecord>, ConnHausError> {
        if let Some(existing) = self.lookup(name) {
            if existing.is_healthy() {
                if existing.config() != &config {
                    tracing::warn!(
                        connection = %name,
                        "initialize called with a different configuration; reusing the healthy connection"
                    );
                }
                debug_log!(connection = %name, id = %existing.id(), "reusing healthy connection");
                self.signals.emit(
                    ConnectionEvent::new(EventType::Reused, name).with_backend(existing.kind()),
                );
                return Ok(existing);
            }
            self.retire(name).await;
        }

        let opened = self
            .open_with_retry(name, kind, opener, &config)
            .await;
        let (handle, latency) = match opened {
            Ok(opened) => opened,
            Err(error) => {
                tracing::warn!(
                    connection = %name,
                    backend = %kind,
                    error = %error,
                    "failed to open connection"
                );
                self.signals.emit(
                    ConnectionEvent::new(EventType::OpenFailed, name)
                        .with_backend(kind)
                        .with_message(error.to_string()),
                );
                return Err(error);
            }
        };

        let prober = HealthProber::new(config.options.timeout());
        let interval = config.options.health_check_interval();
        let record = Arc::new(ConnectionRecord::new(
            name,
            kind,
            handle,
            config,
            ConnectionHealth::healthy(latency),
        ));
        let monitor = CancellationToken::new();
        self.spawn_monitor(record.clone(), monitor.clone(), prober, interval);

        let displaced = self.write_connections().insert(
            name.to_string(),
            RegisteredConnection {
                record: record.clone(),
                monitor,
            },
        );
        if let Some(displaced) = displaced {
            displaced.monitor.cancel();
            if let Err(failure) = self.teardown(&displaced.record).await {
                tracing::debug!(connection = %failure.name, "displaced connection failed to close");
            }
        }

        tracing::info!(connection = %name, backend = %kind, id = %record.id(), "connection opened");
        self.signals
            .emit(ConnectionEvent::new(EventType::Opened, name).with_backend(kind));
        Ok(record)
    }

    /// [`ConnectionManager::initialize`] under the default name
    pub async fn initialize_default(
        &self,
        config: ConnectionConfig,
    ) -> Result<Arc<ConnectionRecord>, ConnHausError> {
        self.initialize(DEFAULT_CONNECTION_NAME, config).await
    }

    /// Initialize every connection in `app_config` concurrently
    pub async fn initialize_all(
        &self,
        app_config: &AppConfig,
    ) -> BTreeMap<String, Result<Arc<ConnectionRecord>, ConnHausError>> {
        let opens = app_config.connections.iter().map(|(name, config)| async move {
            (name.clone(), self.initialize(name, config.clone()).await)
        });
        join_all(opens).await.into_iter().collect()
    }

    /// Registered connection under `name`. Never reconnects.
    pub fn get(&self, name: &str) -> Result<Arc<ConnectionRecord>, ConnHausError> {
        let record = self
            .lookup(name)
            .ok_or_else(|| ConnHausError::NotFound(name.to_string()))?;

        let health = record.health();
        if health.status == HealthStatus::Unhealthy {
            return Err(ConnHausError::Unhealthy {
                name: name.to_string(),
                last_error: health.last_error,
            });
        }
        Ok(record)
    }

    pub fn get_default(&self) -> Result<Arc<ConnectionRecord>, ConnHausError> {
        self.get(DEFAULT_CONNECTION_NAME)
    }

    /// Probe every registered connection now and report the aggregate
    pub async fn health_check(&self) -> AggregateHealthStatus {
        let records = self.records();
        let probes = records.iter().map(|record| async move {
            let prober = HealthProber::new(record.config().options.timeout());
            let _probing = record.lock_probing().await;
            let next = prober
                .probe(record.handle().as_ref(), &record.health())
                .await;
            apply_health(record, &self.signals, next.clone());
            (record.name().to_string(), next)
        });

        let aggregate =
            AggregateHealthStatus::from_connections(join_all(probes).await.into_iter().collect());
        debug_log!(
            status = aggregate.status.as_str(),
            connections = aggregate.connections.len(),
            "health check complete"
        );
        aggregate
    }

    /// Stop monitoring, tear down and unregister `name`. Unknown names are a no-op.
    pub async fn close_connection(&self, name: &str) -> Result<(), ConnHausError> {
        let lock = self.name_lock(name);
        let result = {
            let _guard = lock.lock().await;
            self.close_registered(name).await
        };
        drop(lock);
        self.release_name_lock(name);
        result
    }

    async fn close_registered(&self, name: &str) -> Result<(), ConnHausError> {
        let removed = self.write_connections().remove(name);
        let Some(entry) = removed else {
            debug_log!(connection = %name, "close requested for unknown connection");
            return Ok(());
        };
        entry.monitor.cancel();

        self.teardown(&entry.record)
            .await
            .map_err(|failure| ConnHausError::Teardown {
                name: failure.name,
                message: failure.message,
            })
    }

    /// Close every connection concurrently. Every record is unregistered even
    /// when some teardowns fail; the failures are reported together.
    pub async fn close_all(&self) -> Result<(), ConnHausError> {
        let entries: Vec<RegisteredConnection> = self
            .write_connections()
            .drain()
            .map(|(_, entry)| entry)
            .collect();

        for entry in &entries {
            entry.monitor.cancel();
            self.release_name_lock(entry.record.name());
        }

        let failures: Vec<TeardownFailure> = join_all(
            entries.iter().map(|entry| self.teardown(&entry.record)),
        )
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ConnHausError::CloseAll { failures })
        }
    }

    /// Registered names, sorted
    pub fn connection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_connections().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_connections().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read_connections().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_connections().is_empty()
    }

    async fn open_with_retry(
        &self,
        name: &str,
        kind: BackendKind,
        opener: &dyn BackendOpener,
        config: &ConnectionConfig,
    ) -> Result<(Arc<dyn BackendHandle>, Duration), ConnHausError> {
        let policy = RetryPolicy::from_options(&config.options);
        let timeout = config.options.timeout();
        let request = OpenRequest::new(kind, config.url.clone())
            .with_auth_token(config.auth_token.clone())
            .with_schema(self.schema.clone())
            .with_pool_size(config.options.pool_size)
            .with_timeout(timeout);
        let prober = HealthProber::new(timeout);

        let request = &request;
        let prober = &prober;
        policy
            .execute_observed(
                move |_| open_attempt(opener, request, prober, timeout),
                |state| {
                    if let RetryState::Waiting {
                        delay, last_error, ..
                    } = state
                    {
                        self.signals.emit(
                            ConnectionEvent::new(EventType::RetryScheduled, name)
                                .with_backend(kind)
                                .with_message(format!(
                                    "retrying in {}ms: {}",
                                    delay.as_millis(),
                                    last_error
                                )),
                        );
                    }
                },
            )
            .await
    }

    fn spawn_monitor(
        &self,
        record: Arc<ConnectionRecord>,
        cancel: CancellationToken,
        prober: HealthProber,
        interval: Duration,
    ) {
        let signals = self.signals.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let _probing = record.lock_probing().await;
                let next = prober
                    .probe(record.handle().as_ref(), &record.health())
                    .await;
                // closed while probing: the result belongs to a dead record
                if cancel.is_cancelled() {
                    trace_log!(connection = %record.name(), "discarding probe result after cancellation");
                    break;
                }
                apply_health(&record, &signals, next);
            }
            trace_log!(connection = %record.name(), "health monitor stopped");
        });
    }

    /// Unregister and tear down a record that is about to be replaced
    async fn retire(&self, name: &str) {
        let removed = self.write_connections().remove(name);
        let Some(entry) = removed else {
            return;
        };
        entry.monitor.cancel();
        tracing::info!(
            connection = %name,
            status = entry.record.status().as_str(),
            "replacing connection"
        );
        if let Err(failure) = self.teardown(&entry.record).await {
            tracing::debug!(connection = %failure.name, "replaced connection failed to close");
        }
    }

    async fn teardown(&self, record: &ConnectionRecord) -> Result<(), TeardownFailure> {
        match record.teardown().await {
            Ok(()) => {
                debug_log!(connection = %record.name(), "connection closed");
                self.signals.emit(
                    ConnectionEvent::new(EventType::Closed, record.name())
                        .with_backend(record.kind()),
                );
                Ok(())
            }
            Err(error) => {
                let message = sanitize_message(&error.to_string());
                tracing::warn!(connection = %record.name(), error = %message, "failed to close connection");
                self.signals.emit(
                    ConnectionEvent::new(EventType::CloseFailed, record.name())
                        .with_backend(record.kind())
                        .with_message(message.clone()),
                );
                Err(TeardownFailure {
                    name: record.name().to_string(),
                    message,
                })
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<ConnectionRecord>> {
        self.read_connections()
            .get(name)
            .map(|entry| entry.record.clone())
    }

    fn records(&self) -> Vec<Arc<ConnectionRecord>> {
        self.read_connections()
            .values()
            .map(|entry| entry.record.clone())
            .collect()
    }

    fn name_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.name_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Forget the lock for `name` once nobody else holds a clone of it
    fn release_name_lock(&self, name: &str) {
        let mut locks = self
            .name_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(name)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(name);
        }
    }

    #[cfg(test)]
    fn name_lock_count(&self) -> usize {
        self.name_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn read_connections(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, RegisteredConnection>> {
        self.connections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_connections(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, RegisteredConnection>> {
        self.connections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One open + probe, bounded by the per-attempt timeout when configured
async fn open_attempt(
    opener: &dyn BackendOpener,
    request: &OpenRequest,
    prober: &HealthProber,
    timeout: Option<Duration>,
) -> Result<(Arc<dyn BackendHandle>, Duration), ConnHausError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, open_and_probe(opener, request, prober))
            .await
            .map_err(|_| {
                ConnHausError::transient(format!(
                    "connection attempt timed out after {}ms",
                    limit.as_millis()
                ))
            })?,
        None => open_and_probe(opener, request, prober).await,
    }
}

/// A handle whose first probe fails is closed before the failure is reported
async fn open_and_probe(
    opener: &dyn BackendOpener,
    request: &OpenRequest,
    prober: &HealthProber,
) -> Result<(Arc<dyn BackendHandle>, Duration), ConnHausError> {
    let handle = opener.open(request).await?;
    match prober.measure(handle.as_ref()).await {
        Ok(latency) => Ok((handle, latency)),
        Err(error) => {
            if let Err(close_error) = handle.close().await {
                tracing::warn!(
                    error = %sanitize_message(&close_error.to_string()),
                    "failed to close handle after failed probe"
                );
            }
            Err(ConnHausError::transient(error))
        }
    }
}

/// Install a probe result and announce status transitions
fn apply_health(record: &ConnectionRecord, signals: &SignalManager, next: ConnectionHealth) {
    let status = next.status;
    let error_count = next.error_count;
    let previous = record.replace_health(next);
    if previous.status == status {
        return;
    }

    match status {
        HealthStatus::Unhealthy => tracing::warn!(
            connection = %record.name(),
            error_count,
            "connection is unhealthy"
        ),
        HealthStatus::Degraded => tracing::warn!(
            connection = %record.name(),
            error_count,
            "connection is degraded"
        ),
        HealthStatus::Healthy => tracing::info!(
            connection = %record.name(),
            "connection recovered"
        ),
    }
    signals.emit(
        ConnectionEvent::new(EventType::HealthChanged, record.name())
            .with_backend(record.kind())
            .with_message(status.as_str()),
    );
}
