//! Periodic trigger for the retention sweeper
//!
//! Reads the clock once per cycle and hands that instant to the sweeper, so
//! every post in a cycle is judged against the same cutoff. Cancelling the
//! token stops the loop between cycles and interrupts a running sweep
//! between posts.

use crate::clock::Clock;
use crate::config::RetentionConfig;
use crate::metrics::retention as metrics;
use crate::workers::retention_sweeper::{RetentionSweeper, SweepReport};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct SweepScheduler {
    sweeper: Arc<RetentionSweeper>,
    clock: Arc<dyn Clock>,
    config: RetentionConfig,
    cancel: CancellationToken,
}

impl SweepScheduler {
    pub fn new(
        sweeper: Arc<RetentionSweeper>,
        clock: Arc<dyn Clock>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            sweeper,
            clock,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops this scheduler when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            window_secs = self.config.window.num_seconds(),
            batch_size = self.config.batch_size,
            "Starting retention sweeper"
        );

        if self.config.run_on_start {
            self.run_cycle().await;
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.config.interval) => {
                    self.run_cycle().await;
                }
            }
        }

        info!("Retention sweeper stopped");
    }

    /// One sweep cycle; errors are logged, never propagated
    pub async fn run_cycle(&self) -> Option<SweepReport> {
        if self.cancel.is_cancelled() {
            return None;
        }

        let now = self.clock.now();
        let cycle_start = Instant::now();
        info!(now = %now, "Running retention sweep cycle");

        let result = self
            .sweeper
            .sweep_until(now, self.config.window, &self.cancel)
            .await;
        metrics::record_sweep_duration(cycle_start.elapsed());

        match result {
            Ok(report) => {
                metrics::record_sweep_run(if report.failed_post_ids.is_empty() {
                    "success"
                } else {
                    "partial"
                });
                info!(
                    candidates = report.candidates,
                    deleted_posts = report.deleted_post_count,
                    failed_posts = report.failed_post_count(),
                    deleted_comments = report.deleted_comments,
                    deleted_likes = report.deleted_likes,
                    deleted_comment_likes = report.deleted_comment_likes,
                    interrupted = report.interrupted,
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Retention sweep cycle completed"
                );
                Some(report)
            }
            Err(e) => {
                metrics::record_sweep_run("error");
                error!(
                    error = %e,
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Retention sweep cycle failed"
                );
                None
            }
        }
    }
}
