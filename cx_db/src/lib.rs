//! ABOUTME: Database layer with SQLite pool lifecycle, migrations, and repositories
//! ABOUTME: Handles connection retry, query timeouts, pool health, and persistence

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cx_config::DatabaseConfig;
use cx_core::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, error, info, instrument, warn};

pub mod metrics;
pub mod monitor;
pub mod query;
pub mod repositories;

pub use metrics::PoolMetrics;
pub use monitor::{classify_utilization, monitor_interval, spawn_pool_monitor, UtilizationTier};
pub use query::{spawn_leak_detector, QueryTracker};
pub use repositories::{
    applications::{Application, ApplicationRepository, ApplicationStatus, CreateApplicationRequest},
    feedback::{CreateFeedbackRequest, Feedback, FeedbackRepository},
    projects::{
        CreateProjectRequest, Project, ProjectFilter, ProjectRepository, ProjectStatus,
        UpdateProjectRequest,
    },
    users::{CreateUserRequest, UpdateUserRequest, User, UserRepository},
    PageInfo, PageParams, Paginated,
};

/// Maximum number of initial-connect attempts before startup aborts
pub const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Base delay for linear connect backoff (delay = base x attempt number)
pub const CONNECT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Connection lifecycle state, tracked for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Read-only snapshot of live pool counters, recomputed on demand
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PoolStats {
    pub total_connections: u32,
    pub idle_connections: u32,
    pub waiting_requests: u32,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl PoolStats {
    /// Pool utilization in [0.0, 1.0]
    pub fn utilization(&self) -> f64 {
        if self.max_connections == 0 {
            return 0.0;
        }
        f64::from(self.total_connections) / f64::from(self.max_connections)
    }
}

/// Result of a health probe; never an error
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub pool: PoolStats,
}

/// Database connection pool and lifecycle manager.
///
/// Explicitly constructed and passed by clone/Arc; there is no hidden
/// global instance.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    config: DatabaseConfig,
    state: Arc<Mutex<PoolState>>,
    queries: Arc<QueryTracker>,
    metrics: Arc<PoolMetrics>,
}

impl Database {
    /// Establish the pool, retrying transient failures with linear backoff.
    ///
    /// Attempts at most [`MAX_CONNECT_ATTEMPTS`] times, waiting
    /// `CONNECT_BACKOFF_BASE x attempt` between failures (2s, then 4s).
    /// Exhaustion propagates the final error; the process must not serve
    /// traffic in that state.
    #[instrument(skip(config), fields(db = %config.url))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database at: {}", config.url);

        let state = Arc::new(Mutex::new(PoolState::Connecting));
        let metrics = Arc::new(PoolMetrics::new());

        let pool = connect_with_backoff(
            || Self::try_connect(config),
            CONNECT_BACKOFF_BASE,
            MAX_CONNECT_ATTEMPTS,
            &metrics,
        )
        .await?;

        let db = Self {
            pool,
            config: config.clone(),
            state,
            queries: Arc::new(QueryTracker::new()),
            metrics,
        };

        db.migrate().await?;
        db.set_state(PoolState::Connected);

        info!("Database connected");
        Ok(db)
    }

    /// Single connection attempt
    async fn try_connect(config: &DatabaseConfig) -> Result<SqlitePool> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&config.url)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true)
            .pragma("foreign_keys", "ON")
            .pragma("synchronous", "NORMAL")
            .pragma("busy_timeout", "30000");

        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(connect_options)
            .await
            .map_err(|e| Error::Database(format!("Failed to create connection pool: {}", e)))
    }

    /// Run database migrations
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Release all pooled connections.
    ///
    /// Safe to call when already disconnected; on the shutdown path cleanup
    /// is best-effort and never propagates.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        {
            let mut state = self.state.lock().expect("pool state lock poisoned");
            if *state != PoolState::Connected {
                debug!(?state, "Disconnect requested while not connected, ignoring");
                return;
            }
            *state = PoolState::Disconnecting;
        }

        info!("Closing database connection pool");
        self.pool.close().await;
        self.set_state(PoolState::Disconnected);
        info!("Database connection pool closed");
    }

    /// Probe the database with a trivial query.
    ///
    /// Never returns an error: failures are reported as `healthy: false`
    /// with whatever pool stats are available.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthReport {
        let healthy = match self
            .timed("health.check", sqlx::query("SELECT 1").fetch_one(&self.pool))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                false
            }
        };

        HealthReport {
            healthy,
            pool: self.pool_stats(),
        }
    }

    /// Live pool counters; pure read, no failure mode
    pub fn pool_stats(&self) -> PoolStats {
        let waiting = self.metrics.requests_waiting.get().max(0) as u32;
        PoolStats {
            total_connections: self.pool.size(),
            idle_connections: self.pool.num_idle() as u32,
            waiting_requests: waiting,
            max_connections: self.config.max_connections,
            min_connections: self.config.min_connections,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> PoolState {
        *self.state.lock().expect("pool state lock poisoned")
    }

    fn set_state(&self, next: PoolState) {
        *self.state.lock().expect("pool state lock poisoned") = next;
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get pool metrics
    pub fn metrics(&self) -> &Arc<PoolMetrics> {
        &self.metrics
    }

    /// Get the in-flight query tracker
    pub fn query_tracker(&self) -> &Arc<QueryTracker> {
        &self.queries
    }

    /// Configured per-query timeout
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.config.query_timeout_secs)
    }

    /// Run a query future under the configured timeout, recording it in the
    /// in-flight registry and pool metrics.
    ///
    /// A timeout abandons the operation from the caller's perspective and
    /// yields [`Error::DatabaseTimeout`], which the web layer maps to 503
    /// rather than 500.
    pub async fn timed<T, Fut>(&self, label: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let _guard = self.queries.start(label);

        // SqlitePool exposes no waiter count, so track saturation ourselves:
        // a query entering while every connection is checked out will wait.
        let saturated =
            self.pool.num_idle() == 0 && self.pool.size() >= self.config.max_connections;
        if saturated {
            self.metrics.requests_waiting.inc();
        }

        let result = tokio::time::timeout(self.query_timeout(), fut).await;

        if saturated {
            self.metrics.requests_waiting.dec();
        }

        match result {
            Ok(Ok(value)) => {
                self.metrics.record_executed();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.metrics.record_failed();
                Err(map_sqlx_error(e))
            }
            Err(_) => {
                self.metrics.record_timeout();
                let stats = self.pool_stats();
                error!(
                    query = %label,
                    timeout_ms = self.query_timeout().as_millis() as u64,
                    pool_total = stats.total_connections,
                    pool_idle = stats.idle_connections,
                    pool_waiting = stats.waiting_requests,
                    "Query exceeded timeout, abandoning"
                );
                Err(Error::DatabaseTimeout(format!(
                    "{} exceeded {}s query timeout",
                    label, self.config.query_timeout_secs
                )))
            }
        }
    }

    /// Update idle/active pool gauges from live pool state
    pub fn update_pool_metrics(&self) {
        let idle = self.pool.num_idle() as i64;
        let size = self.pool.size() as i64;
        self.metrics.set_idle(idle);
        self.metrics.set_active(size - idle);
    }
}

/// Retry an async connect operation with linear backoff.
///
/// The attempt counter is local to each call, so a later reconnect gets a
/// fresh retry budget.
pub(crate) async fn connect_with_backoff<T, F, Fut>(
    mut op: F,
    base_delay: Duration,
    max_attempts: u32,
    metrics: &PoolMetrics,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Connected successfully after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                attempt += 1;

                if attempt >= max_attempts {
                    tracing::error!(
                        attempts = attempt,
                        error = %e,
                        "Failed to connect after all retry attempts"
                    );
                    return Err(e);
                }

                metrics.record_connect_retry();
                let delay = base_delay * attempt;
                warn!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Database connect failed, retrying after delay"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Translate a sqlx error into the core taxonomy.
///
/// Unique-constraint violations become [`Error::Conflict`] carrying the
/// offending column names so the API can report them.
pub fn map_sqlx_error(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::RowNotFound => Error::NotFound("Record not found".to_string()),
        sqlx::Error::PoolTimedOut => {
            Error::DatabaseTimeout("Timed out waiting for a pooled connection".to_string())
        }
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Error::Conflict {
            fields: unique_violation_fields(db_err.message()),
        },
        _ => Error::Database(err.to_string()),
    }
}

/// Extract column names from a SQLite unique-violation message,
/// e.g. "UNIQUE constraint failed: users.email"
fn unique_violation_fields(message: &str) -> Vec<String> {
    let Some(rest) = message.strip_prefix("UNIQUE constraint failed: ") else {
        return vec!["unknown".to_string()];
    };

    rest.split(',')
        .map(|column| {
            column
                .trim()
                .rsplit('.')
                .next()
                .unwrap_or(column.trim())
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use test_support::{temp_db_config, temp_db_path};
    use tokio::time::Instant;

    pub(crate) async fn create_test_db() -> Database {
        let config = temp_db_config();
        Database::connect(&config)
            .await
            .expect("Failed to create test database")
    }

    #[tokio::test]
    async fn test_connect_and_health_check() {
        let db = create_test_db().await;
        assert_eq!(db.state(), PoolState::Connected);

        let report = db.health_check().await;
        assert!(report.healthy);
        assert_eq!(report.pool.max_connections, 5);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let db = create_test_db().await;

        db.disconnect().await;
        assert_eq!(db.state(), PoolState::Disconnected);

        // Second call is a no-op
        db.disconnect().await;
        assert_eq!(db.state(), PoolState::Disconnected);
    }

    #[tokio::test]
    async fn test_health_check_reports_unhealthy_after_close() {
        let db = create_test_db().await;
        db.disconnect().await;

        let report = db.health_check().await;
        assert!(!report.healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_fail_twice_then_succeed() {
        let metrics = PoolMetrics::new();
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let result = connect_with_backoff(
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::Database("connection refused".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            },
            CONNECT_BACKOFF_BASE,
            MAX_CONNECT_ATTEMPTS,
            &metrics,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Linear backoff: 2s after the first failure, 4s after the second
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert_eq!(metrics.connect_retries.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_exhausts_after_three_attempts() {
        let metrics = PoolMetrics::new();
        let attempts = AtomicU32::new(0);

        let result: Result<()> = connect_with_backoff(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Database("connection refused".to_string())) }
            },
            CONNECT_BACKOFF_BASE,
            MAX_CONNECT_ATTEMPTS,
            &metrics,
        )
        .await;

        assert!(matches!(result, Err(Error::Database(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timed_query_timeout_maps_to_database_timeout() {
        let mut config = temp_db_config();
        config.query_timeout_secs = 1;
        let db = Database::connect(&config).await.expect("connect");

        // A future that never completes stands in for a stuck query
        let result: Result<()> = db
            .timed("test.stuck", async {
                futures_util::future::pending::<std::result::Result<(), sqlx::Error>>().await
            })
            .await;

        assert!(matches!(result, Err(Error::DatabaseTimeout(_))));
        assert_eq!(db.metrics().queries_timeout.get(), 1);
        // The guard is dropped with the abandoned future
        assert_eq!(db.query_tracker().in_flight_count(), 0);
    }

    #[test]
    fn test_unique_violation_fields() {
        assert_eq!(
            unique_violation_fields("UNIQUE constraint failed: users.email"),
            vec!["email"]
        );
        assert_eq!(
            unique_violation_fields(
                "UNIQUE constraint failed: applications.project_id, applications.student_id"
            ),
            vec!["project_id", "student_id"]
        );
        assert_eq!(unique_violation_fields("something else"), vec!["unknown"]);
    }

    #[test]
    fn test_map_sqlx_error_variants() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            Error::NotFound(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            Error::DatabaseTimeout(_)
        ));
    }

    #[test]
    fn test_temp_db_path_is_unique() {
        assert_ne!(temp_db_path(), temp_db_path());
    }
}
