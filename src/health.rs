//! Health probing and classification
//!
//! A probe is a minimal read against an open backend handle. Its outcome is
//! folded into the previous [`ConnectionHealth`] to produce the next one;
//! the prober never writes anything back itself.

use chrono::{DateTime, Utc};
use driver_system::BackendHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::sanitize::sanitize_message;

/// Consecutive failed probes tolerated before a connection is unhealthy
pub const UNHEALTHY_ERROR_THRESHOLD: u32 = 3;

/// Health status of a connection, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Status after `error_count` consecutive failed probes
    pub fn from_error_count(error_count: u32) -> Self {
        match error_count {
            0 => HealthStatus::Healthy,
            n if n > UNHEALTHY_ERROR_THRESHOLD => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        }
    }

    /// Worst status across `statuses`; nothing to report counts as unhealthy
    pub fn worst_of<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        statuses.into_iter().max().unwrap_or(HealthStatus::Unhealthy)
    }

    /// Both `Healthy` and `Degraded` can still serve queries
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Rolling health snapshot of one connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHealth {
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    /// Round-trip time of the last successful probe
    pub latency_ms: Option<f64>,
    /// Failed probes since the last successful one
    pub error_count: u32,
    /// Sanitized message of the last failure
    pub last_error: Option<String>,
}

impl ConnectionHealth {
    pub fn healthy(latency: Duration) -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_check: Utc::now(),
            latency_ms: Some(duration_ms(latency)),
            error_count: 0,
            last_error: None,
        }
    }

    /// Next snapshot after a successful probe; clears any error history
    pub fn record_success(&self, latency: Duration) -> Self {
        Self::healthy(latency)
    }

    /// Next snapshot after a failed probe
    pub fn record_failure(&self, error: &str) -> Self {
        let error_count = self.error_count.saturating_add(1);
        Self {
            status: HealthStatus::from_error_count(error_count),
            last_check: Utc::now(),
            latency_ms: self.latency_ms,
            error_count,
            last_error: Some(sanitize_message(error)),
        }
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency_ms
            .map(|ms| Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }
}

/// Runs probes and classifies their outcome
#[derive(Debug, Clone, Default)]
pub struct HealthProber {
    timeout: Option<Duration>,
}

impl HealthProber {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Probe `handle` and fold the outcome into `previous`
    pub async fn probe(
        &self,
        handle: &dyn BackendHandle,
        previous: &ConnectionHealth,
    ) -> ConnectionHealth {
        match self.measure(handle).await {
            Ok(latency) => previous.record_success(latency),
            Err(error) => previous.record_failure(&error),
        }
    }

    /// Time one probe, failing with the raw error text
    pub async fn measure(&self, handle: &dyn BackendHandle) -> Result<Duration, String> {
        let started = Instant::now();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, handle.probe()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(format!(
                        "health probe timed out after {}ms",
                        limit.as_millis()
                    ));
                }
            },
            None => handle.probe().await,
        };
        outcome
            .map(|_| started.elapsed())
            .map_err(|error| error.to_string())
    }
}

/// Aggregate view over every registered connection, computed on demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateHealthStatus {
    pub status: HealthStatus,
    pub connections: BTreeMap<String, ConnectionHealth>,
    pub timestamp: DateTime<Utc>,
}

impl AggregateHealthStatus {
    pub fn from_connections(connections: BTreeMap<String, ConnectionHealth>) -> Self {
        Self {
            status: HealthStatus::worst_of(connections.values().map(|health| health.status)),
            connections,
            timestamp: Utc::now(),
        }
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use driver_system::{BackendKind, DriverError};
    use std::any::Any;

    struct StaticHandle {
        ok: bool,
        delay: Duration,
    }

    #[async_trait]
    impl BackendHandle for StaticHandle {
        fn kind(&self) -> BackendKind {
            BackendKind::Postgres
        }

        async fn probe(&self) -> Result<(), DriverError> {
            tokio::time::sleep(self.delay).await;
            if self.ok {
                Ok(())
            } else {
                Err(DriverError::Backend(
                    "probe failed on postgresql://app:hunter2@db/app".to_string(),
                ))
            }
        }

        async fn close(&self) -> Result<(), DriverError> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn after_failures(count: u32) -> ConnectionHealth {
        (0..count).fold(ConnectionHealth::healthy(Duration::ZERO), |health, _| {
            health.record_failure("boom")
        })
    }

    #[test]
    fn test_error_count_boundary() {
        let three = after_failures(3);
        assert_eq!(three.error_count, 3);
        assert_eq!(three.status, HealthStatus::Degraded);

        let four = after_failures(4);
        assert_eq!(four.error_count, 4);
        assert_eq!(four.status, HealthStatus::Unhealthy);

        assert_eq!(after_failures(1).status, HealthStatus::Degraded);
    }

    #[test]
    fn test_success_resets_any_history() {
        for count in [1, 3, 4, 50] {
            let recovered = after_failures(count).record_success(Duration::from_millis(7));
            assert_eq!(recovered.status, HealthStatus::Healthy);
            assert_eq!(recovered.error_count, 0);
            assert_eq!(recovered.last_error, None);
            assert!((recovered.latency_ms.unwrap() - 7.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_failure_keeps_last_latency() {
        let health = ConnectionHealth::healthy(Duration::from_millis(12)).record_failure("boom");
        assert!((health.latency_ms.unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_worst_of() {
        use HealthStatus::*;
        assert_eq!(HealthStatus::worst_of([Healthy, Unhealthy]), Unhealthy);
        assert_eq!(HealthStatus::worst_of([Healthy, Degraded]), Degraded);
        assert_eq!(HealthStatus::worst_of([Degraded, Unhealthy, Healthy]), Unhealthy);
        assert_eq!(HealthStatus::worst_of([Healthy, Healthy]), Healthy);
        assert_eq!(HealthStatus::worst_of(Vec::new()), Unhealthy);
    }

    #[test]
    fn test_empty_aggregate_is_unhealthy() {
        let aggregate = AggregateHealthStatus::from_connections(BTreeMap::new());
        assert_eq!(aggregate.status, HealthStatus::Unhealthy);
        assert!(aggregate.connections.is_empty());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );

        let mut connections = BTreeMap::new();
        connections.insert("default".to_string(), after_failures(1));
        let json = serde_json::to_value(AggregateHealthStatus::from_connections(connections)).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["connections"]["default"]["error_count"], 1);
    }

    #[tokio::test]
    async fn test_probe_success_and_failure() {
        let prober = HealthProber::default();
        let start = after_failures(2);

        let ok = StaticHandle {
            ok: true,
            delay: Duration::ZERO,
        };
        let health = prober.probe(&ok, &start).await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.error_count, 0);

        let failing = StaticHandle {
            ok: false,
            delay: Duration::ZERO,
        };
        let health = prober.probe(&failing, &start).await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.error_count, 3);
        let message = health.last_error.unwrap();
        assert!(message.contains("postgresql://***:***@db/app"));
        assert!(!message.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_probe_timeout_counts_as_failure() {
        let prober = HealthProber::new(Some(Duration::from_millis(10)));
        let slow = StaticHandle {
            ok: true,
            delay: Duration::from_secs(5),
        };

        let health = prober
            .probe(&slow, &ConnectionHealth::healthy(Duration::ZERO))
            .await;
        assert_eq!(health.error_count, 1);
        assert_eq!(
            health.last_error.as_deref(),
            Some("health probe timed out after 10ms")
        );
    }
}
