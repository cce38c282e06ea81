use crate::domain::{Counter, CounterAudit, TargetKind};
use crate::error::{EngagementError, EngagementResult};
use crate::metrics::engagement as metrics;
use crate::storage::{CounterUpdate, Lookup, StorageTx};
use tracing::warn;
use uuid::Uuid;

/// Direction of a counter change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Increment,
    Decrement,
}

impl Delta {
    pub fn value(&self) -> i64 {
        match self {
            Delta::Increment => 1,
            Delta::Decrement => -1,
        }
    }
}

/// Keeps denormalized like/comment counters in step with their rows
///
/// Architecture:
/// - Every change is a single atomic read-modify-write inside the caller's
///   transaction, never a read followed by a separate write
/// - The adjusted row stays locked until the caller commits, which orders
///   concurrent writers on the same target
/// - Counters never drop below zero; a clamp means the stored value had
///   already drifted and is reported
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSynchronizer;

impl CounterSynchronizer {
    pub fn new() -> Self {
        Self
    }

    /// Apply `delta` to `counter` on `target_id`, returning the new value
    pub async fn apply_delta(
        &self,
        tx: &mut dyn StorageTx,
        counter: Counter,
        target_id: Uuid,
        delta: Delta,
    ) -> EngagementResult<CounterUpdate> {
        tx.adjust_counter(counter, target_id, delta.value())
            .await?
            .found_or_else(|| EngagementError::TargetNotFound {
                kind: counter.owner(),
                id: target_id,
            })
    }

    /// Report a clamped update once the change it belongs to is known to stand
    pub fn observe(&self, counter: Counter, target_id: Uuid, update: &CounterUpdate) {
        if update.clamped {
            metrics::record_counter_clamp(counter.as_str());
            warn!(
                counter = counter.as_str(),
                target_id = %target_id,
                "Counter would have gone negative; floored at zero"
            );
        }
    }

    /// Compare stored counters on a target with its live rows
    pub async fn audit(
        &self,
        tx: &mut dyn StorageTx,
        kind: TargetKind,
        target_id: Uuid,
    ) -> EngagementResult<Lookup<CounterAudit>> {
        let audit = match kind {
            TargetKind::Post => {
                let Lookup::Found(post) = tx.find_post(target_id).await? else {
                    return Ok(Lookup::NotFound);
                };
                CounterAudit {
                    target_kind: kind,
                    target_id,
                    stored_likes: post.like_count,
                    live_likes: tx.count_likes(kind, target_id).await?,
                    stored_comments: Some(post.comment_count),
                    live_comments: Some(tx.count_comments(target_id).await?),
                }
            }
            TargetKind::Comment => {
                let Lookup::Found(comment) = tx.find_comment(target_id).await? else {
                    return Ok(Lookup::NotFound);
                };
                CounterAudit {
                    target_kind: kind,
                    target_id,
                    stored_likes: comment.like_count,
                    live_likes: tx.count_likes(kind, target_id).await?,
                    stored_comments: None,
                    live_comments: None,
                }
            }
        };

        if !audit.is_consistent() {
            warn!(
                target = kind.as_str(),
                target_id = %target_id,
                stored_likes = audit.stored_likes,
                live_likes = audit.live_likes,
                "Stored counters disagree with live rows"
            );
        }

        Ok(Lookup::Found(audit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewPost;
    use crate::storage::{MemoryGateway, StorageGateway};
    use chrono::Utc;

    #[tokio::test]
    async fn test_apply_delta_missing_target() {
        let gateway = MemoryGateway::new();
        let mut tx = gateway.begin().await.unwrap();

        let result = CounterSynchronizer::new()
            .apply_delta(
                tx.as_mut(),
                Counter::CommentLikes,
                Uuid::new_v4(),
                Delta::Increment,
            )
            .await;

        assert!(matches!(
            result,
            Err(EngagementError::TargetNotFound {
                kind: TargetKind::Comment,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_audit_detects_drift() {
        let gateway = MemoryGateway::new();
        let sync = CounterSynchronizer::new();
        let mut tx = gateway.begin().await.unwrap();

        let post = tx
            .insert_post(
                &NewPost {
                    author_id: "a".into(),
                    author_name: "A".into(),
                    author_avatar: "https://cdn.example.com/u.png".into(),
                    content: "c".into(),
                    media_url: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        let audit = sync
            .audit(tx.as_mut(), TargetKind::Post, post.id)
            .await
            .unwrap()
            .into_option()
            .unwrap();
        assert!(audit.is_consistent());

        // Counter moved without a matching like row
        sync.apply_delta(tx.as_mut(), Counter::PostLikes, post.id, Delta::Increment)
            .await
            .unwrap();
        let audit = sync
            .audit(tx.as_mut(), TargetKind::Post, post.id)
            .await
            .unwrap()
            .into_option()
            .unwrap();
        assert_eq!(audit.stored_likes, 1);
        assert_eq!(audit.live_likes, 0);
        assert!(!audit.is_consistent());
    }
}
