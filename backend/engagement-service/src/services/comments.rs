use crate::clock::Clock;
use crate::domain::{AddedComment, Comment, CommentDeletion, Counter, NewComment, TargetKind};
use crate::error::{EngagementError, EngagementResult};
use crate::services::counters::{CounterSynchronizer, Delta};
use crate::services::supervisor::ConsistencySupervisor;
use crate::storage::{Lookup, StorageError};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

/// Comments on posts, kept in step with `posts.comment_count`
pub struct CommentService {
    supervisor: Arc<ConsistencySupervisor>,
    counters: CounterSynchronizer,
    clock: Arc<dyn Clock>,
}

impl CommentService {
    pub fn new(supervisor: Arc<ConsistencySupervisor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            supervisor,
            counters: CounterSynchronizer::new(),
            clock,
        }
    }

    pub async fn add_comment(
        &self,
        post_id: Uuid,
        input: NewComment,
    ) -> EngagementResult<AddedComment> {
        input.validate()?;
        let counters = self.counters;
        let now = self.clock.now();

        let added = self
            .supervisor
            .transact("add_comment", move |tx| {
                let input = input.clone();
                Box::pin(async move {
                    let update = counters
                        .apply_delta(tx, Counter::PostComments, post_id, Delta::Increment)
                        .await?;

                    let comment = match tx.insert_comment(post_id, &input, now).await {
                        Ok(comment) => comment,
                        Err(StorageError::ForeignKeyViolation { .. }) => {
                            return Err(EngagementError::TargetNotFound {
                                kind: TargetKind::Post,
                                id: post_id,
                            })
                        }
                        Err(err) => return Err(err.into()),
                    };

                    Ok(AddedComment {
                        comment,
                        comment_count: update.value,
                    })
                })
            })
            .await?;

        debug!(
            post_id = %post_id,
            comment_id = %added.comment.id,
            comment_count = added.comment_count,
            "Comment added"
        );
        Ok(added)
    }

    /// Comments on a post, newest first
    pub async fn list_comments(&self, post_id: Uuid) -> EngagementResult<Vec<Comment>> {
        self.supervisor
            .transact("list_comments", move |tx| {
                Box::pin(async move {
                    if !tx.find_post(post_id).await?.is_found() {
                        return Err(EngagementError::TargetNotFound {
                            kind: TargetKind::Post,
                            id: post_id,
                        });
                    }
                    Ok(tx.list_comments(post_id).await?)
                })
            })
            .await
    }

    /// Delete a comment with its likes and decrement the post's comment count
    pub async fn delete_comment(&self, comment_id: Uuid) -> EngagementResult<CommentDeletion> {
        let counters = self.counters;

        let (deletion, update) = self
            .supervisor
            .transact("delete_comment", move |tx| {
                Box::pin(async move {
                    let not_found = || EngagementError::TargetNotFound {
                        kind: TargetKind::Comment,
                        id: comment_id,
                    };

                    let comment = tx.find_comment(comment_id).await?.found_or_else(not_found)?;

                    // Post row first, same lock order as add_comment
                    let update = counters
                        .apply_delta(tx, Counter::PostComments, comment.post_id, Delta::Decrement)
                        .await?;

                    let removed = match tx.delete_comment_cascade(comment_id).await? {
                        Lookup::Found(removed) => removed,
                        Lookup::NotFound => return Err(not_found()),
                    };

                    Ok((
                        CommentDeletion {
                            comment_id,
                            post_id: removed.post_id,
                            comment_likes: removed.comment_likes,
                            comment_count: update.value,
                        },
                        update,
                    ))
                })
            })
            .await?;

        self.counters
            .observe(Counter::PostComments, deletion.post_id, &update);
        debug!(
            comment_id = %comment_id,
            post_id = %deletion.post_id,
            comment_likes = deletion.comment_likes,
            "Comment deleted"
        );
        Ok(deletion)
    }
}
