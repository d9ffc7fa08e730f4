use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;

/// Health status of a service or dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, HealthStatus::Degraded)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy)
    }
}

/// Health status of a single dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl DependencyHealth {
    pub fn healthy(name: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            message: None,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            latency_ms: None,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

/// Aggregated health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
}

impl AggregatedHealth {
    pub fn new(version: String, uptime_seconds: u64, dependencies: Vec<DependencyHealth>) -> Self {
        let status = Self::aggregate_status(&dependencies);
        Self {
            status,
            version,
            uptime_seconds,
            dependencies,
        }
    }

    fn aggregate_status(dependencies: &[DependencyHealth]) -> HealthStatus {
        let has_unhealthy = dependencies.iter().any(|d| d.status.is_unhealthy());
        let has_degraded = dependencies.iter().any(|d| d.status.is_degraded());

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Health checker for the ledger database and the duplicate-guard store.
pub struct HealthChecker {
    pool: PgPool,
    redis_client: redis::Client,
    probe_timeout: Duration,
    start_time: std::time::Instant,
}

impl HealthChecker {
    pub fn new(pool: PgPool, redis_client: redis::Client) -> Self {
        Self {
            pool,
            redis_client,
            probe_timeout: Duration::from_secs(5),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Performs a full health check of all dependencies.
    pub async fn check_all(&self) -> AggregatedHealth {
        let dependencies = vec![self.check_database().await, self.check_redis().await];

        AggregatedHealth::new(
            env!("CARGO_PKG_VERSION").to_string(),
            self.start_time.elapsed().as_secs(),
            dependencies,
        )
    }

    /// Checks the submission ledger database.
    pub async fn check_database(&self) -> DependencyHealth {
        let start = std::time::Instant::now();

        match tokio::time::timeout(self.probe_timeout, sqlx::query("SELECT 1").fetch_one(&self.pool)).await {
            Ok(Ok(_)) => classify_latency("database", start.elapsed(), 100.0),
            Ok(Err(e)) => DependencyHealth::unhealthy("database", format!("Query failed: {}", e)),
            Err(_) => DependencyHealth::unhealthy("database", "Connection timeout"),
        }
    }

    /// Checks the duplicate-guard store. The boundary fails closed when this
    /// store is slow, so latency degradation is reported early.
    pub async fn check_redis(&self) -> DependencyHealth {
        let start = std::time::Instant::now();

        let probe = async {
            let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<_, ()>(&mut conn).await
        };

        match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(())) => classify_latency("redis", start.elapsed(), 50.0),
            Ok(Err(e)) => DependencyHealth::unhealthy("redis", format!("PING failed: {}", e)),
            Err(_) => DependencyHealth::unhealthy("redis", "PING timeout"),
        }
    }

    /// Liveness check - returns true if the service is alive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Readiness requires both stores: without Redis every submission would
    /// be rejected by the duplicate guard anyway.
    pub async fn is_ready(&self) -> bool {
        let db_health = self.check_database().await;
        let redis_health = self.check_redis().await;

        !db_health.status.is_unhealthy() && !redis_health.status.is_unhealthy()
    }

    /// Returns uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

fn classify_latency(name: &str, elapsed: Duration, degraded_above_ms: f64) -> DependencyHealth {
    let latency = elapsed.as_secs_f64() * 1000.0;
    if latency > degraded_above_ms {
        DependencyHealth {
            name: name.to_string(),
            status: HealthStatus::Degraded,
            latency_ms: Some(latency),
            message: Some("High latency detected".to_string()),
        }
    } else {
        DependencyHealth::healthy(name, latency)
    }
}
