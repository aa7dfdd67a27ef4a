//! ABOUTME: Database connection pool metrics
//! ABOUTME: Provides Prometheus metrics for database pool performance monitoring

use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;

/// Metrics for database connection pool operations
#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    /// Total number of executed queries
    pub queries_executed: Counter,
    /// Total number of query timeouts
    pub queries_timeout: Counter,
    /// Total number of failed queries
    pub queries_failed: Counter,
    /// Total number of initial-connect retries
    pub connect_retries: Counter,
    /// Current number of idle connections in pool
    pub connections_idle: Gauge,
    /// Current number of active connections in pool
    pub connections_active: Gauge,
    /// Current number of requests waiting for a free connection
    pub requests_waiting: Gauge,
}

impl PoolMetrics {
    /// Create new pool metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Register all pool metrics with a Prometheus registry
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "db_queries_executed_total",
            "Total number of executed queries",
            self.queries_executed.clone(),
        );
        registry.register(
            "db_queries_timeout_total",
            "Total number of query timeouts",
            self.queries_timeout.clone(),
        );
        registry.register(
            "db_queries_failed_total",
            "Total number of failed queries",
            self.queries_failed.clone(),
        );
        registry.register(
            "db_connect_retries_total",
            "Total number of initial-connect retries",
            self.connect_retries.clone(),
        );
        registry.register(
            "db_connections_idle",
            "Current number of idle pool connections",
            self.connections_idle.clone(),
        );
        registry.register(
            "db_connections_active",
            "Current number of active pool connections",
            self.connections_active.clone(),
        );
        registry.register(
            "db_requests_waiting",
            "Current number of requests waiting for a connection",
            self.requests_waiting.clone(),
        );
    }

    /// Record an executed query
    pub fn record_executed(&self) {
        self.queries_executed.inc();
    }

    /// Record a query timeout
    pub fn record_timeout(&self) {
        self.queries_timeout.inc();
    }

    /// Record a failed query
    pub fn record_failed(&self) {
        self.queries_failed.inc();
    }

    /// Record an initial-connect retry attempt
    pub fn record_connect_retry(&self) {
        self.connect_retries.inc();
    }

    /// Update idle connections count
    pub fn set_idle(&self, count: i64) {
        self.connections_idle.set(count);
    }

    /// Update active connections count
    pub fn set_active(&self, count: i64) {
        self.connections_active.set(count);
    }

    /// Update waiting requests count
    pub fn set_waiting(&self, count: i64) {
        self.requests_waiting.set(count);
    }
}
