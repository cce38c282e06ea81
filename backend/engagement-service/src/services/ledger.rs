/// Like ledger for posts and comments
///
/// Each like or unlike moves the like row and the owning counter together
/// in one supervised transaction. The counter is adjusted first so the
/// target row is locked before the like row is touched; concurrent requests
/// for the same target queue on that lock and then observe each other's
/// committed rows.
use crate::clock::Clock;
use crate::domain::{LikeOutcome, TargetKind};
use crate::error::{EngagementError, EngagementResult};
use crate::metrics::engagement as metrics;
use crate::services::counters::{CounterSynchronizer, Delta};
use crate::services::supervisor::ConsistencySupervisor;
use crate::storage::{Lookup, StorageError};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct EngagementLedger {
    supervisor: Arc<ConsistencySupervisor>,
    counters: CounterSynchronizer,
    clock: Arc<dyn Clock>,
}

impl EngagementLedger {
    pub fn new(supervisor: Arc<ConsistencySupervisor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            supervisor,
            counters: CounterSynchronizer::new(),
            clock,
        }
    }

    /// Record that `liker_id` likes the target
    ///
    /// Fails with `AlreadyLiked` if the pair already exists and
    /// `TargetNotFound` if the target is missing; neither changes state.
    pub async fn like(
        &self,
        kind: TargetKind,
        target_id: Uuid,
        liker_id: &str,
    ) -> EngagementResult<LikeOutcome> {
        let result = self.apply_like(kind, target_id, liker_id).await;
        metrics::record_ledger_outcome(kind.as_str(), "like", &result);
        result
    }

    /// Remove the like by `liker_id` on the target
    ///
    /// Fails with `NotLiked` if there is nothing to remove.
    pub async fn unlike(
        &self,
        kind: TargetKind,
        target_id: Uuid,
        liker_id: &str,
    ) -> EngagementResult<LikeOutcome> {
        let result = self.apply_unlike(kind, target_id, liker_id).await;
        metrics::record_ledger_outcome(kind.as_str(), "unlike", &result);
        result
    }

    async fn apply_like(
        &self,
        kind: TargetKind,
        target_id: Uuid,
        liker_id: &str,
    ) -> EngagementResult<LikeOutcome> {
        validate_liker(liker_id)?;

        let counters = self.counters;
        let counter = kind.like_counter();
        let liker = liker_id.to_string();
        let now = self.clock.now();

        let outcome = self
            .supervisor
            .transact("like", move |tx| {
                let liker = liker.clone();
                Box::pin(async move {
                    let update = counters
                        .apply_delta(tx, counter, target_id, Delta::Increment)
                        .await?;

                    match tx.insert_like(kind, target_id, &liker, now).await {
                        Ok(_) => Ok(LikeOutcome {
                            applied: true,
                            like_count: update.value,
                        }),
                        Err(StorageError::UniqueViolation { .. }) => {
                            Err(EngagementError::AlreadyLiked { kind, target_id })
                        }
                        Err(StorageError::ForeignKeyViolation { .. }) => {
                            Err(EngagementError::TargetNotFound {
                                kind,
                                id: target_id,
                            })
                        }
                        Err(err) => Err(err.into()),
                    }
                })
            })
            .await?;

        debug!(
            target = kind.as_str(),
            target_id = %target_id,
            liker_id,
            like_count = outcome.like_count,
            "Like recorded"
        );
        Ok(outcome)
    }

    async fn apply_unlike(
        &self,
        kind: TargetKind,
        target_id: Uuid,
        liker_id: &str,
    ) -> EngagementResult<LikeOutcome> {
        validate_liker(liker_id)?;

        let counters = self.counters;
        let counter = kind.like_counter();
        let liker = liker_id.to_string();

        let update = self
            .supervisor
            .transact("unlike", move |tx| {
                let liker = liker.clone();
                Box::pin(async move {
                    let update = counters
                        .apply_delta(tx, counter, target_id, Delta::Decrement)
                        .await?;

                    match tx.delete_like(kind, target_id, &liker).await? {
                        Lookup::Found(_) => Ok(update),
                        Lookup::NotFound => Err(EngagementError::NotLiked { kind, target_id }),
                    }
                })
            })
            .await?;

        self.counters.observe(counter, target_id, &update);
        debug!(
            target = kind.as_str(),
            target_id = %target_id,
            liker_id,
            like_count = update.value,
            "Like removed"
        );

        Ok(LikeOutcome {
            applied: true,
            like_count: update.value,
        })
    }
}

fn validate_liker(liker_id: &str) -> EngagementResult<()> {
    if liker_id.trim().is_empty() {
        return Err(EngagementError::InvalidInput(
            "liker id must not be empty".to_string(),
        ));
    }
    Ok(())
}
