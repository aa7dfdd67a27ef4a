//! ABOUTME: Retry policy for mail delivery attempts
//! ABOUTME: Linear delay, capped attempt count

use std::time::Duration;

/// Retry configuration for the delivery worker
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Delay before the given retry attempt (1-based): base x attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_linearly() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        };
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(10));
    }
}
