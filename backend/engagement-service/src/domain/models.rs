use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Which kind of entity a like (or a like counter) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Post,
    Comment,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Post => "post",
            TargetKind::Comment => "comment",
        }
    }

    /// The denormalized counter tracking likes on this kind of target
    pub fn like_counter(&self) -> Counter {
        match self {
            TargetKind::Post => Counter::PostLikes,
            TargetKind::Comment => Counter::CommentLikes,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A denormalized count stored on a post or comment row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// posts.like_count
    PostLikes,
    /// posts.comment_count
    PostComments,
    /// comments.like_count
    CommentLikes,
}

impl Counter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::PostLikes => "post_likes",
            Counter::PostComments => "post_comments",
            Counter::CommentLikes => "comment_likes",
        }
    }

    /// Kind of row the counter lives on
    pub fn owner(&self) -> TargetKind {
        match self {
            Counter::PostLikes | Counter::PostComments => TargetKind::Post,
            Counter::CommentLikes => TargetKind::Comment,
        }
    }
}

/// Post entity - the root of every engagement row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: String,
    pub author_name: String,
    pub author_avatar: String,
    pub content: String,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub like_count: i64,
    pub comment_count: i64,
}

/// Comment entity - represents a comment on a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: String,
    pub author_name: String,
    pub author_avatar: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: i64,
}

/// Like entity - one user liking one post or comment
///
/// Post likes and comment likes live in separate tables with the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub id: Uuid,
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub liker_id: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a post
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewPost {
    #[validate(length(min = 1))]
    pub author_id: String,
    #[validate(length(min = 1))]
    pub author_name: String,
    #[validate(length(min = 1))]
    pub author_avatar: String,
    #[validate(length(min = 1))]
    pub content: String,
    #[validate(url)]
    pub media_url: Option<String>,
}

/// Replacement content for an existing post
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PostUpdate {
    #[validate(length(min = 1))]
    pub content: String,
    #[validate(url)]
    pub media_url: Option<String>,
}

/// Input for adding a comment
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewComment {
    #[validate(length(min = 1))]
    pub author_id: String,
    #[validate(length(min = 1))]
    pub author_name: String,
    #[validate(length(min = 1))]
    pub author_avatar: String,
    #[validate(length(min = 1))]
    pub text: String,
}

/// One page of the newest-first post listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Result of a like or unlike that took effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeOutcome {
    pub applied: bool,
    /// Counter value after the change
    pub like_count: i64,
}

/// A freshly stored comment plus the post's new comment count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedComment {
    pub comment: Comment,
    pub comment_count: i64,
}

/// Rows removed together with a post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub comments: u64,
    pub likes: u64,
    pub comment_likes: u64,
}

/// Rows removed together with a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedComment {
    pub post_id: Uuid,
    pub comment_likes: u64,
}

/// Summary of a comment deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDeletion {
    pub comment_id: Uuid,
    pub post_id: Uuid,
    pub comment_likes: u64,
    pub comment_count: i64,
}

/// Stored counters next to the live row counts they summarize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterAudit {
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub stored_likes: i64,
    pub live_likes: i64,
    /// Only tracked for posts
    pub stored_comments: Option<i64>,
    pub live_comments: Option<i64>,
}

impl CounterAudit {
    pub fn is_consistent(&self) -> bool {
        self.stored_likes == self.live_likes && self.stored_comments == self.live_comments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_post() -> NewPost {
        NewPost {
            author_id: "u-1".into(),
            author_name: "Ada".into(),
            author_avatar: "https://cdn.example.com/a.png".into(),
            content: "hello".into(),
            media_url: None,
        }
    }

    #[test]
    fn test_new_post_validation() {
        assert!(new_post().validate().is_ok());

        let empty_content = NewPost {
            content: String::new(),
            ..new_post()
        };
        assert!(empty_content.validate().is_err());

        let no_avatar = NewPost {
            author_avatar: String::new(),
            ..new_post()
        };
        assert!(no_avatar.validate().is_err());

        let bad_media = NewPost {
            media_url: Some("not a url".into()),
            ..new_post()
        };
        assert!(bad_media.validate().is_err());

        let good_media = NewPost {
            media_url: Some("https://cdn.example.com/p.jpg".into()),
            ..new_post()
        };
        assert!(good_media.validate().is_ok());
    }

    #[test]
    fn test_counter_owner() {
        assert_eq!(TargetKind::Post.like_counter(), Counter::PostLikes);
        assert_eq!(TargetKind::Comment.like_counter(), Counter::CommentLikes);
        assert_eq!(Counter::PostComments.owner(), TargetKind::Post);
        assert_eq!(Counter::CommentLikes.owner(), TargetKind::Comment);
    }

    #[test]
    fn test_audit_consistency() {
        let mut audit = CounterAudit {
            target_kind: TargetKind::Post,
            target_id: Uuid::new_v4(),
            stored_likes: 2,
            live_likes: 2,
            stored_comments: Some(1),
            live_comments: Some(1),
        };
        assert!(audit.is_consistent());

        audit.live_comments = Some(0);
        assert!(!audit.is_consistent());
    }
}
