/// Transaction supervisor
///
/// Runs each logical operation as one storage transaction: begin, run the
/// operation body, then commit on success or roll back on any error.
/// Transient write conflicts restart the whole body in a fresh transaction
/// with backoff, up to the configured attempt budget.
use crate::error::{EngagementError, EngagementResult};
use crate::metrics::engagement as metrics;
use crate::storage::{StorageGateway, StorageTx};
use futures::future::BoxFuture;
use resilience::{with_retry_if, RetryConfig, RetryError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Future returned by a transaction body
pub type TxFuture<'t, T> = BoxFuture<'t, EngagementResult<T>>;

pub struct ConsistencySupervisor {
    gateway: Arc<dyn StorageGateway>,
    retry: RetryConfig,
}

impl ConsistencySupervisor {
    pub fn new(gateway: Arc<dyn StorageGateway>, retry: RetryConfig) -> Self {
        Self { gateway, retry }
    }

    pub fn gateway(&self) -> &Arc<dyn StorageGateway> {
        &self.gateway
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Run `work` atomically, retrying transient conflicts
    ///
    /// `work` may run several times; each run sees a fresh transaction and
    /// none of the writes of earlier, rolled-back runs. Business outcomes and
    /// infrastructure faults are returned as-is after rollback.
    pub async fn transact<T, F>(&self, operation: &'static str, work: F) -> EngagementResult<T>
    where
        T: Send,
        F: for<'t> Fn(&'t mut dyn StorageTx) -> TxFuture<'t, T> + Send + Sync,
    {
        let work = &work;
        let result = with_retry_if(&self.retry, EngagementError::is_transient, move || {
            self.attempt(operation, work)
        })
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(RetryError::Exhausted { attempts, last }) => {
                metrics::record_conflicts_exhausted(operation);
                warn!(
                    operation,
                    attempts,
                    error = %last,
                    "Giving up after repeated write conflicts"
                );
                Err(EngagementError::ConflictExhausted {
                    operation,
                    attempts,
                })
            }
            Err(RetryError::Aborted(err)) => Err(err),
        }
    }

    async fn attempt<T, F>(&self, operation: &'static str, work: &F) -> EngagementResult<T>
    where
        F: for<'t> Fn(&'t mut dyn StorageTx) -> TxFuture<'t, T>,
    {
        metrics::record_tx_attempt(operation);
        let mut tx = self.gateway.begin().await?;

        let outcome = work(tx.as_mut()).await;
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        operation,
                        error = %rollback_err,
                        "Rollback failed; connection discarded"
                    );
                }
                debug!(operation, error = %err, "Transaction rolled back");
                Err(err)
            }
        }
    }

    /// Open and immediately roll back a transaction
    pub async fn probe(&self) -> EngagementResult<()> {
        let tx = self.gateway.begin().await?;
        tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewPost;
    use crate::storage::{MemoryGateway, StorageError};
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_retry(attempts: u32) -> RetryConfig {
        RetryConfig {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            jitter: false,
            ..RetryConfig::default()
        }
        .with_max_attempts(attempts)
    }

    fn new_post() -> NewPost {
        NewPost {
            author_id: "u".into(),
            author_name: "U".into(),
            author_avatar: "https://cdn.example.com/u.png".into(),
            content: "x".into(),
            media_url: None,
        }
    }

    #[tokio::test]
    async fn test_conflict_then_success_commits_once() {
        let gateway = MemoryGateway::new();
        gateway.fail_next_commits(1, StorageError::SerializationFailure("injected".into()));
        let supervisor = ConsistencySupervisor::new(Arc::new(gateway.clone()), fast_retry(3));

        let runs = AtomicU32::new(0);
        let runs_ref = &runs;
        let post = supervisor
            .transact("create_post", move |tx| {
                runs_ref.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    Ok(tx.insert_post(&new_post(), Utc::now()).await?)
                })
            })
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(gateway.post_count().await, 1);
        assert_eq!(post.content, "x");
    }

    #[tokio::test]
    async fn test_exhausted_conflicts_leave_no_writes() {
        let gateway = MemoryGateway::new();
        gateway.fail_next_commits(3, StorageError::SerializationFailure("injected".into()));
        let supervisor = ConsistencySupervisor::new(Arc::new(gateway.clone()), fast_retry(3));

        let result = supervisor
            .transact("create_post", |tx| {
                Box::pin(async move {
                    Ok(tx.insert_post(&new_post(), Utc::now()).await?)
                })
            })
            .await;

        assert_eq!(
            result.unwrap_err(),
            EngagementError::ConflictExhausted {
                operation: "create_post",
                attempts: 3
            }
        );
        assert_eq!(gateway.post_count().await, 0);
    }

    #[tokio::test]
    async fn test_business_error_rolls_back_without_retry() {
        let gateway = MemoryGateway::new();
        let supervisor = ConsistencySupervisor::new(Arc::new(gateway.clone()), fast_retry(3));

        let runs = AtomicU32::new(0);
        let runs_ref = &runs;
        let result: EngagementResult<()> = supervisor
            .transact("create_post", move |tx| {
                runs_ref.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    tx.insert_post(&new_post(), Utc::now()).await?;
                    Err(EngagementError::InvalidInput("rejected".into()))
                })
            })
            .await;

        assert!(matches!(result, Err(EngagementError::InvalidInput(_))));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.post_count().await, 0);
    }

    #[tokio::test]
    async fn test_probe_reports_pool_exhaustion() {
        let gateway = MemoryGateway::with_limits(1, Duration::from_millis(10));
        let supervisor = ConsistencySupervisor::new(Arc::new(gateway.clone()), fast_retry(1));
        assert!(supervisor.probe().await.is_ok());

        let _held = gateway.begin().await.unwrap();
        assert!(matches!(
            supervisor.probe().await,
            Err(EngagementError::ResourceUnavailable(_))
        ));
    }
}
