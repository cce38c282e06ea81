/// Preset retry configurations
use crate::retry::RetryConfig;
use std::time::Duration;

/// Database transactions that may hit serialization failures or deadlocks
///
/// - 3 attempts in total
/// - 25ms initial backoff, doubling, capped at 1s
/// - Jitter on, so colliding writers spread out
pub fn transaction_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_backoff: Duration::from_millis(25),
        max_backoff: Duration::from_secs(1),
        backoff_multiplier: 2.0,
        jitter: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_retry_budget() {
        let config = transaction_retry();
        assert_eq!(config.max_attempts(), 3);
        assert!(config.initial_backoff < config.max_backoff);
    }
}
