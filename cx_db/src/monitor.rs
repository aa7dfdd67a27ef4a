//! ABOUTME: Periodic pool utilization monitoring with tiered severities
//! ABOUTME: Samples live pool stats and logs exhaustion warnings

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{Database, PoolStats};

/// Utilization classification for a monitoring sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtilizationTier {
    /// Below 80% of max connections
    Normal,
    /// At or above 80%, below 90%
    Elevated,
    /// At or above 90% - pool near exhaustion
    Critical,
}

/// Classify pool utilization (total / max)
pub fn classify_utilization(total: u32, max: u32) -> UtilizationTier {
    if max == 0 {
        return UtilizationTier::Normal;
    }
    let utilization = f64::from(total) / f64::from(max);
    if utilization >= 0.9 {
        UtilizationTier::Critical
    } else if utilization >= 0.8 {
        UtilizationTier::Elevated
    } else {
        UtilizationTier::Normal
    }
}

/// Sampling cadence: tighter in production
pub fn monitor_interval(production: bool) -> Duration {
    if production {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(300)
    }
}

fn log_sample(stats: &PoolStats) {
    let tier = classify_utilization(stats.total_connections, stats.max_connections);
    let pct = (stats.utilization() * 100.0).round() as u32;

    match tier {
        UtilizationTier::Critical => error!(
            total = stats.total_connections,
            max = stats.max_connections,
            utilization_pct = pct,
            "Connection pool near exhaustion"
        ),
        UtilizationTier::Elevated => warn!(
            total = stats.total_connections,
            max = stats.max_connections,
            utilization_pct = pct,
            "Connection pool utilization elevated"
        ),
        UtilizationTier::Normal => info!(
            total = stats.total_connections,
            idle = stats.idle_connections,
            max = stats.max_connections,
            utilization_pct = pct,
            "Connection pool utilization sample"
        ),
    }

    // Blocked acquirers are worth a warning at any utilization level
    if stats.waiting_requests > 0 {
        warn!(
            waiting = stats.waiting_requests,
            "Requests are waiting for a free database connection"
        );
    }
}

/// Spawn the periodic pool monitor task
pub fn spawn_pool_monitor(db: Database, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup logs stay quiet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            db.update_pool_metrics();
            log_sample(&db.pool_stats());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_utilization_tiers() {
        // 17 of 20 = 85% -> warning tier
        assert_eq!(classify_utilization(17, 20), UtilizationTier::Elevated);
        // 19 of 20 = 95% -> critical tier
        assert_eq!(classify_utilization(19, 20), UtilizationTier::Critical);
        // Boundary cases
        assert_eq!(classify_utilization(16, 20), UtilizationTier::Elevated); // 80%
        assert_eq!(classify_utilization(18, 20), UtilizationTier::Critical); // 90%
        assert_eq!(classify_utilization(15, 20), UtilizationTier::Normal); // 75%
        assert_eq!(classify_utilization(0, 20), UtilizationTier::Normal);
        assert_eq!(classify_utilization(5, 0), UtilizationTier::Normal);
    }

    #[test]
    fn test_monitor_interval() {
        assert_eq!(monitor_interval(true), Duration::from_secs(60));
        assert_eq!(monitor_interval(false), Duration::from_secs(300));
    }

    #[test]
    fn test_log_sample_does_not_panic() {
        let stats = PoolStats {
            total_connections: 19,
            idle_connections: 0,
            waiting_requests: 3,
            max_connections: 20,
            min_connections: 1,
        };
        log_sample(&stats);
    }
}
