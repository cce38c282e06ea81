//! Retention sweeper
//!
//! Deletes posts older than the retention window together with their
//! comments, comment likes, and likes.
//!
//! Each expired post is removed in its own supervised transaction, so one
//! failing post never blocks the others and never leaves a partial cascade
//! behind. Posts already gone when their turn comes are skipped, which makes
//! a second sweep with the same `now` a no-op.

use crate::error::EngagementResult;
use crate::metrics::retention as metrics;
use crate::services::ConsistencySupervisor;
use crate::storage::Lookup;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of posts handled between yields to the runtime
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Outcome of one sweep cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub cutoff: Option<DateTime<Utc>>,
    /// Expired posts found by the scan
    pub candidates: usize,
    pub deleted_post_count: usize,
    /// Posts removed by someone else between scan and delete
    pub already_gone: usize,
    pub failed_post_ids: Vec<Uuid>,
    pub deleted_comments: u64,
    pub deleted_likes: u64,
    pub deleted_comment_likes: u64,
    /// Cancellation stopped the cycle before every candidate was handled
    pub interrupted: bool,
}

impl SweepReport {
    pub fn failed_post_count(&self) -> usize {
        self.failed_post_ids.len()
    }
}

pub struct RetentionSweeper {
    supervisor: Arc<ConsistencySupervisor>,
    batch_size: usize,
}

impl RetentionSweeper {
    pub fn new(supervisor: Arc<ConsistencySupervisor>, batch_size: usize) -> Self {
        Self {
            supervisor,
            batch_size: batch_size.max(1),
        }
    }

    /// Delete every post created strictly before `now - window`
    ///
    /// Only a failed scan fails the cycle; per-post failures are logged,
    /// counted in the report, and left for the next cycle.
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> EngagementResult<SweepReport> {
        self.sweep_until(now, window, &CancellationToken::new())
            .await
    }

    /// Like [`sweep`](Self::sweep), stopping between posts once `cancel` fires
    pub async fn sweep_until(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        cancel: &CancellationToken,
    ) -> EngagementResult<SweepReport> {
        let cutoff = now
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let candidates = self.supervisor.gateway().expired_post_ids(cutoff).await?;

        let mut report = SweepReport {
            cutoff: Some(cutoff),
            candidates: candidates.len(),
            ..SweepReport::default()
        };
        metrics::set_sweep_candidates(candidates.len());

        if candidates.is_empty() {
            debug!(cutoff = %cutoff, "No expired posts");
            return Ok(report);
        }

        info!(
            cutoff = %cutoff,
            candidates = candidates.len(),
            "Sweeping expired posts"
        );

        'batches: for batch in candidates.chunks(self.batch_size) {
            for &post_id in batch {
                if cancel.is_cancelled() {
                    report.interrupted = true;
                    break 'batches;
                }
                self.sweep_post(post_id, &mut report).await;
            }

            // Let request traffic in between batches
            tokio::task::yield_now().await;
        }

        metrics::record_rows_deleted("posts", report.deleted_post_count as u64);
        metrics::record_rows_deleted("comments", report.deleted_comments);
        metrics::record_rows_deleted("likes", report.deleted_likes);
        metrics::record_rows_deleted("comment_likes", report.deleted_comment_likes);

        Ok(report)
    }

    async fn sweep_post(&self, post_id: Uuid, report: &mut SweepReport) {
        let result = self
            .supervisor
            .transact("retention_cascade", move |tx| {
                Box::pin(async move { Ok(tx.delete_post_cascade(post_id).await?) })
            })
            .await;

        match result {
            Ok(Lookup::Found(cascade)) => {
                report.deleted_post_count += 1;
                report.deleted_comments += cascade.comments;
                report.deleted_likes += cascade.likes;
                report.deleted_comment_likes += cascade.comment_likes;
                debug!(
                    post_id = %post_id,
                    comments = cascade.comments,
                    likes = cascade.likes,
                    comment_likes = cascade.comment_likes,
                    "Expired post deleted"
                );
            }
            Ok(Lookup::NotFound) => {
                report.already_gone += 1;
            }
            Err(e) => {
                metrics::record_failed_post();
                warn!(
                    post_id = %post_id,
                    error = %e,
                    "Failed to delete expired post, will retry next cycle"
                );
                report.failed_post_ids.push(post_id);
            }
        }
    }
}
