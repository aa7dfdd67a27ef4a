//! ABOUTME: In-flight query tracking and leak detection
//! ABOUTME: Records query start times so long-abandoned queries can be reported

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How often the leak detector scans the in-flight registry
pub const LEAK_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// A query is a suspected leak once it has been in flight for this
/// multiple of the configured query timeout.
pub const LEAK_AGE_MULTIPLIER: u32 = 2;

#[derive(Debug, Clone)]
struct InFlightQuery {
    label: String,
    started: Instant,
}

/// Registry of queries currently in flight.
///
/// Entries are added when a query starts and removed by the RAII guard when
/// it completes or is abandoned. The leak detector only observes; it never
/// removes entries.
#[derive(Debug, Default)]
pub struct QueryTracker {
    next_id: AtomicU64,
    in_flight: Mutex<HashMap<u64, InFlightQuery>>,
}

impl QueryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a query; the returned guard deregisters it on drop.
    pub fn start(self: &Arc<Self>, label: &str) -> QueryGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = InFlightQuery {
            label: label.to_string(),
            started: Instant::now(),
        };
        self.in_flight
            .lock()
            .expect("query tracker lock poisoned")
            .insert(id, entry);

        QueryGuard {
            id,
            tracker: Arc::clone(self),
        }
    }

    /// Number of queries currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .expect("query tracker lock poisoned")
            .len()
    }

    /// Labels and ages of queries older than the given threshold
    pub fn suspected_leaks(&self, older_than: Duration) -> Vec<(String, Duration)> {
        let now = Instant::now();
        self.in_flight
            .lock()
            .expect("query tracker lock poisoned")
            .values()
            .filter(|q| now.duration_since(q.started) > older_than)
            .map(|q| (q.label.clone(), now.duration_since(q.started)))
            .collect()
    }

    fn finish(&self, id: u64) {
        self.in_flight
            .lock()
            .expect("query tracker lock poisoned")
            .remove(&id);
    }
}

/// RAII guard removing the in-flight entry when the query future settles
/// or is dropped.
pub struct QueryGuard {
    id: u64,
    tracker: Arc<QueryTracker>,
}

impl Drop for QueryGuard {
    fn drop(&mut self) {
        self.tracker.finish(self.id);
    }
}

/// Spawn the background leak detector.
///
/// Scans the registry every [`LEAK_SCAN_INTERVAL`] and logs queries in flight
/// longer than `LEAK_AGE_MULTIPLIER x query_timeout`. Purely observational;
/// takes no corrective action.
pub fn spawn_leak_detector(
    tracker: Arc<QueryTracker>,
    query_timeout: Duration,
) -> JoinHandle<()> {
    let threshold = query_timeout * LEAK_AGE_MULTIPLIER;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LEAK_SCAN_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let leaks = tracker.suspected_leaks(threshold);
            if leaks.is_empty() {
                debug!(
                    in_flight = tracker.in_flight_count(),
                    "Leak scan completed, no suspects"
                );
                continue;
            }

            for (label, age) in leaks {
                warn!(
                    query = %label,
                    age_ms = age.as_millis() as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "Suspected leaked query still in flight"
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_registers_and_deregisters() {
        let tracker = Arc::new(QueryTracker::new());
        assert_eq!(tracker.in_flight_count(), 0);

        let guard = tracker.start("users.find_by_id");
        assert_eq!(tracker.in_flight_count(), 1);

        drop(guard);
        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[test]
    fn test_suspected_leaks_respects_threshold() {
        let tracker = Arc::new(QueryTracker::new());
        let _guard = tracker.start("projects.list");

        // Fresh query is not a leak
        assert!(tracker.suspected_leaks(Duration::from_secs(1)).is_empty());

        // With a zero threshold everything in flight qualifies
        std::thread::sleep(Duration::from_millis(5));
        let leaks = tracker.suspected_leaks(Duration::ZERO);
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].0, "projects.list");
    }

    #[test]
    fn test_concurrent_guards_tracked_independently() {
        let tracker = Arc::new(QueryTracker::new());
        let g1 = tracker.start("a");
        let g2 = tracker.start("b");
        assert_eq!(tracker.in_flight_count(), 2);

        drop(g1);
        assert_eq!(tracker.in_flight_count(), 1);
        drop(g2);
        assert_eq!(tracker.in_flight_count(), 0);
    }
}
