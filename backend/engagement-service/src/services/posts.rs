use crate::clock::Clock;
use crate::domain::{CascadeReport, CounterAudit, NewPost, Post, PostPage, PostUpdate, TargetKind};
use crate::error::{EngagementError, EngagementResult};
use crate::services::counters::CounterSynchronizer;
use crate::services::supervisor::ConsistencySupervisor;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Post lifecycle: create, read, edit, delete with cascade
pub struct PostService {
    supervisor: Arc<ConsistencySupervisor>,
    counters: CounterSynchronizer,
    clock: Arc<dyn Clock>,
}

impl PostService {
    pub fn new(supervisor: Arc<ConsistencySupervisor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            supervisor,
            counters: CounterSynchronizer::new(),
            clock,
        }
    }

    pub async fn create_post(&self, input: NewPost) -> EngagementResult<Post> {
        input.validate()?;
        let now = self.clock.now();

        let post = self
            .supervisor
            .transact("create_post", move |tx| {
                let input = input.clone();
                Box::pin(async move { Ok(tx.insert_post(&input, now).await?) })
            })
            .await?;

        info!(post_id = %post.id, author_id = %post.author_id, "Post created");
        Ok(post)
    }

    pub async fn get_post(&self, id: Uuid) -> EngagementResult<Post> {
        self.supervisor
            .transact("get_post", move |tx| {
                Box::pin(async move {
                    tx.find_post(id).await?.found_or_else(|| {
                        EngagementError::TargetNotFound {
                            kind: TargetKind::Post,
                            id,
                        }
                    })
                })
            })
            .await
    }

    /// Newest-first page; `limit` defaults to 10 and is capped at 100
    pub async fn list_posts(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> EngagementResult<PostPage> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);

        self.supervisor
            .transact("list_posts", move |tx| {
                Box::pin(async move {
                    let posts = tx.list_posts(limit, offset).await?;
                    let total_count = tx.count_posts().await?;
                    Ok(PostPage {
                        posts,
                        total_count,
                        limit,
                        offset,
                    })
                })
            })
            .await
    }

    /// Replace content and media; counters and creation time are untouched
    pub async fn update_post(&self, id: Uuid, update: PostUpdate) -> EngagementResult<Post> {
        update.validate()?;
        let now = self.clock.now();

        self.supervisor
            .transact("update_post", move |tx| {
                let update = update.clone();
                Box::pin(async move {
                    tx.update_post(id, &update, now).await?.found_or_else(|| {
                        EngagementError::TargetNotFound {
                            kind: TargetKind::Post,
                            id,
                        }
                    })
                })
            })
            .await
    }

    /// Delete a post with all of its comments, comment likes, and likes
    pub async fn delete_post(&self, id: Uuid) -> EngagementResult<CascadeReport> {
        let report = self
            .supervisor
            .transact("delete_post", move |tx| {
                Box::pin(async move {
                    tx.delete_post_cascade(id).await?.found_or_else(|| {
                        EngagementError::TargetNotFound {
                            kind: TargetKind::Post,
                            id,
                        }
                    })
                })
            })
            .await?;

        info!(
            post_id = %id,
            comments = report.comments,
            likes = report.likes,
            comment_likes = report.comment_likes,
            "Post deleted"
        );
        Ok(report)
    }

    /// Stored counters of a post or comment next to its live row counts
    pub async fn audit_counters(
        &self,
        kind: TargetKind,
        id: Uuid,
    ) -> EngagementResult<CounterAudit> {
        let counters = self.counters;
        self.supervisor
            .transact("audit_counters", move |tx| {
                Box::pin(async move {
                    counters
                        .audit(tx, kind, id)
                        .await?
                        .found_or_else(|| EngagementError::TargetNotFound { kind, id })
                })
            })
            .await
    }
}
