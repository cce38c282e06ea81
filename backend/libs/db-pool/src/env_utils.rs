//! Environment variable parsing utilities
//!
//! Safe functions for reading typed settings with defaults, so config loaders
//! never need unwrap() on user-supplied values.

use std::str::FromStr;
use std::time::Duration;

/// Parse an environment variable with a default fallback
///
/// Missing and unparseable values both fall back to `default`.
///
/// # Example
/// ```ignore
/// let port: u16 = parse_env_with_default("PORT", 8000);
/// ```
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    parse_env_optional(key).unwrap_or(default)
}

/// Parse an environment variable, returning None if missing or invalid
pub fn parse_env_optional<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a required environment variable
///
/// # Example
/// ```ignore
/// let database_url = parse_env_required::<String>("DATABASE_URL")?;
/// ```
pub fn parse_env_required<T: FromStr>(key: &str) -> Result<T, String> {
    std::env::var(key)
        .map_err(|_| format!("{} environment variable not set", key))?
        .trim()
        .parse()
        .map_err(|_| format!("Failed to parse environment variable {}", key))
}

/// Read a whole number of seconds as a Duration
pub fn parse_env_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(parse_env_with_default(key, default_secs))
}

/// Read a whole number of milliseconds as a Duration
pub fn parse_env_millis(key: &str, default_millis: u64) -> Duration {
    Duration::from_millis(parse_env_with_default(key, default_millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_parse_env_with_default() {
        let result: u32 = parse_env_with_default("DB_POOL_NONEXISTENT_VAR", 42);
        assert_eq!(result, 42);

        std::env::set_var("DB_POOL_TEST_PORT", "8080");
        let result: u16 = parse_env_with_default("DB_POOL_TEST_PORT", 3000);
        assert_eq!(result, 8080);

        std::env::set_var("DB_POOL_TEST_PORT", "not-a-port");
        let result: u16 = parse_env_with_default("DB_POOL_TEST_PORT", 3000);
        assert_eq!(result, 3000);
        std::env::remove_var("DB_POOL_TEST_PORT");
    }

    #[test]
    #[serial_test::serial]
    fn test_parse_env_required() {
        let result = parse_env_required::<u32>("DB_POOL_NONEXISTENT_VAR");
        assert!(result.is_err());

        std::env::set_var("DB_POOL_TEST_REQ", " 456 ");
        let result = parse_env_required::<u32>("DB_POOL_TEST_REQ");
        assert_eq!(result, Ok(456));
        std::env::remove_var("DB_POOL_TEST_REQ");
    }

    #[test]
    #[serial_test::serial]
    fn test_parse_env_durations() {
        std::env::set_var("DB_POOL_TEST_SECS", "90");
        assert_eq!(
            parse_env_secs("DB_POOL_TEST_SECS", 5),
            Duration::from_secs(90)
        );
        std::env::remove_var("DB_POOL_TEST_SECS");

        assert_eq!(
            parse_env_millis("DB_POOL_NONEXISTENT_VAR", 250),
            Duration::from_millis(250)
        );
    }
}
