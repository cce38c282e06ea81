/// Resilience patterns for storage-bound services
///
/// This library provides:
/// - **Retry**: Exponential backoff with jitter, optionally gated by a predicate so
///   that only transient failures are retried
/// - **Preset Configurations**: Pre-tuned retry settings for transactional work
///
/// # Example: Retry only transient failures
///
/// ```rust,no_run
/// use resilience::{presets, with_retry_if};
///
/// #[derive(Debug)]
/// enum DbError { Conflict, Fatal }
///
/// impl std::fmt::Display for DbError {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "{:?}", self)
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let config = presets::transaction_retry();
///
///     let result = with_retry_if(
///         &config,
///         |e: &DbError| matches!(e, DbError::Conflict),
///         || async { Ok::<_, DbError>(()) },
///     )
///     .await;
///     assert!(result.is_ok());
/// }
/// ```

pub mod presets;
pub mod retry;

pub use presets::transaction_retry;
pub use retry::{with_retry_if, RetryConfig, RetryError};
