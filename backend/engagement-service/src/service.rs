use crate::clock::Clock;
use crate::domain::{
    AddedComment, CascadeReport, Comment, CommentDeletion, CounterAudit, LikeOutcome, NewComment,
    NewPost, Post, PostPage, PostUpdate, TargetKind,
};
use crate::error::EngagementResult;
use crate::services::{CommentService, ConsistencySupervisor, EngagementLedger, PostService};
use crate::storage::StorageGateway;
use crate::workers::{RetentionSweeper, SweepReport};
use chrono::{DateTime, Duration, Utc};
use resilience::RetryConfig;
use std::sync::Arc;
use uuid::Uuid;

/// Entry point for every engagement operation
///
/// All components share one supervisor, so every mutation gets the same
/// transaction and retry policy.
pub struct EngagementService {
    supervisor: Arc<ConsistencySupervisor>,
    posts: PostService,
    comments: CommentService,
    ledger: EngagementLedger,
    sweeper: Arc<RetentionSweeper>,
}

impl EngagementService {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        clock: Arc<dyn Clock>,
        retry: RetryConfig,
        sweep_batch_size: usize,
    ) -> Self {
        let supervisor = Arc::new(ConsistencySupervisor::new(gateway, retry));

        Self {
            posts: PostService::new(supervisor.clone(), clock.clone()),
            comments: CommentService::new(supervisor.clone(), clock.clone()),
            ledger: EngagementLedger::new(supervisor.clone(), clock),
            sweeper: Arc::new(RetentionSweeper::new(supervisor.clone(), sweep_batch_size)),
            supervisor,
        }
    }

    pub fn sweeper(&self) -> Arc<RetentionSweeper> {
        self.sweeper.clone()
    }

    /// Storage round trip used by the health endpoint
    pub async fn ping(&self) -> EngagementResult<()> {
        self.supervisor.probe().await
    }

    // ========== Posts ==========

    pub async fn create_post(&self, input: NewPost) -> EngagementResult<Post> {
        self.posts.create_post(input).await
    }

    pub async fn get_post(&self, id: Uuid) -> EngagementResult<Post> {
        self.posts.get_post(id).await
    }

    pub async fn list_posts(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> EngagementResult<PostPage> {
        self.posts.list_posts(limit, offset).await
    }

    pub async fn update_post(&self, id: Uuid, update: PostUpdate) -> EngagementResult<Post> {
        self.posts.update_post(id, update).await
    }

    pub async fn delete_post(&self, id: Uuid) -> EngagementResult<CascadeReport> {
        self.posts.delete_post(id).await
    }

    pub async fn audit_counters(
        &self,
        kind: TargetKind,
        id: Uuid,
    ) -> EngagementResult<CounterAudit> {
        self.posts.audit_counters(kind, id).await
    }

    // ========== Comments ==========

    pub async fn add_comment(
        &self,
        post_id: Uuid,
        input: NewComment,
    ) -> EngagementResult<AddedComment> {
        self.comments.add_comment(post_id, input).await
    }

    pub async fn list_comments(&self, post_id: Uuid) -> EngagementResult<Vec<Comment>> {
        self.comments.list_comments(post_id).await
    }

    pub async fn delete_comment(&self, comment_id: Uuid) -> EngagementResult<CommentDeletion> {
        self.comments.delete_comment(comment_id).await
    }

    // ========== Likes ==========

    pub async fn like(
        &self,
        kind: TargetKind,
        target_id: Uuid,
        liker_id: &str,
    ) -> EngagementResult<LikeOutcome> {
        self.ledger.like(kind, target_id, liker_id).await
    }

    pub async fn unlike(
        &self,
        kind: TargetKind,
        target_id: Uuid,
        liker_id: &str,
    ) -> EngagementResult<LikeOutcome> {
        self.ledger.unlike(kind, target_id, liker_id).await
    }

    // ========== Retention ==========

    /// Delete posts created strictly before `now - window`, with their children
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> EngagementResult<SweepReport> {
        self.sweeper.sweep(now, window).await
    }
}
