//! ABOUTME: Shared testing utilities and helper functions
//! ABOUTME: Common test fixtures for all crates

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use cx_config::DatabaseConfig;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Path for a unique throwaway SQLite database file
pub fn temp_db_path() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir()
        .join(format!(
            "codionix-test-{}-{}-{}.db",
            std::process::id(),
            nanos,
            n
        ))
        .to_string_lossy()
        .into_owned()
}

/// Database configuration pointing at a unique throwaway SQLite file,
/// sized small so pool saturation is easy to exercise in tests
pub fn temp_db_config() -> DatabaseConfig {
    DatabaseConfig {
        url: temp_db_path(),
        max_connections: 5,
        min_connections: 1,
        acquire_timeout_secs: 5,
        query_timeout_secs: 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_db_paths_are_unique() {
        assert_ne!(temp_db_path(), temp_db_path());
    }

    #[test]
    fn test_temp_db_config_is_small() {
        let config = temp_db_config();
        assert_eq!(config.max_connections, 5);
        assert!(config.url.ends_with(".db"));
    }
}
