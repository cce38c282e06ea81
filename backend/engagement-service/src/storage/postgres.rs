use super::{CounterUpdate, IsolationLevel, Lookup, StorageError, StorageGateway, StorageTx};
use crate::domain::{
    CascadeReport, Comment, Counter, Like, NewComment, NewPost, Post, PostUpdate, RemovedComment,
    TargetKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

/// PostgreSQL-backed storage gateway
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
    service: String,
    isolation: IsolationLevel,
}

impl PgGateway {
    pub fn new(pool: PgPool, service: impl Into<String>, isolation: IsolationLevel) -> Self {
        Self {
            pool,
            service: service.into(),
            isolation,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StorageGateway for PgGateway {
    async fn begin(&self) -> Result<Box<dyn StorageTx>, StorageError> {
        let mut tx = db_pool::begin_with_metrics(&self.pool, &self.service).await?;

        // Must be the first statement of the transaction
        let set_isolation = format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            self.isolation.as_sql()
        );
        sqlx::query(&set_isolation).execute(&mut *tx).await?;

        Ok(Box::new(PgTx { tx }))
    }

    async fn expired_post_ids(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM posts
            WHERE created_at < $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

/// Like row as stored in either `likes` or `comment_likes`
#[derive(sqlx::FromRow)]
struct LikeRow {
    id: Uuid,
    target_id: Uuid,
    user_id: String,
    created_at: DateTime<Utc>,
}

impl LikeRow {
    fn into_like(self, kind: TargetKind) -> Like {
        Like {
            id: self.id,
            target_kind: kind,
            target_id: self.target_id,
            liker_id: self.user_id,
            created_at: self.created_at,
        }
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StorageTx for PgTx {
    async fn insert_post(
        &mut self,
        post: &NewPost,
        now: DateTime<Utc>,
    ) -> Result<Post, StorageError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, author_id, author_name, author_avatar, content, media_url,
                               created_at, updated_at, like_count, comment_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, 0, 0)
            RETURNING id, author_id, author_name, author_avatar, content, media_url,
                      created_at, updated_at, like_count, comment_count
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&post.author_id)
        .bind(&post.author_name)
        .bind(&post.author_avatar)
        .bind(&post.content)
        .bind(&post.media_url)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(post)
    }

    async fn update_post(
        &mut self,
        id: Uuid,
        update: &PostUpdate,
        now: DateTime<Utc>,
    ) -> Result<Lookup<Post>, StorageError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
            SET content = $2, media_url = $3, updated_at = $4
            WHERE id = $1
            RETURNING id, author_id, author_name, author_avatar, content, media_url,
                      created_at, updated_at, like_count, comment_count
            "#,
        )
        .bind(id)
        .bind(&update.content)
        .bind(&update.media_url)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(post.into())
    }

    async fn find_post(&mut self, id: Uuid) -> Result<Lookup<Post>, StorageError> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, author_id, author_name, author_avatar, content, media_url,
                   created_at, updated_at, like_count, comment_count
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(post.into())
    }

    async fn list_posts(&mut self, limit: i64, offset: i64) -> Result<Vec<Post>, StorageError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, author_id, author_name, author_avatar, content, media_url,
                   created_at, updated_at, like_count, comment_count
            FROM posts
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(posts)
    }

    async fn count_posts(&mut self) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count)
    }

    async fn insert_comment(
        &mut self,
        post_id: Uuid,
        comment: &NewComment,
        now: DateTime<Utc>,
    ) -> Result<Comment, StorageError> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (id, post_id, author_id, author_name, author_avatar, text,
                                  created_at, like_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0)
            RETURNING id, post_id, author_id, author_name, author_avatar, text,
                      created_at, like_count
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(post_id)
        .bind(&comment.author_id)
        .bind(&comment.author_name)
        .bind(&comment.author_avatar)
        .bind(&comment.text)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(comment)
    }

    async fn find_comment(&mut self, id: Uuid) -> Result<Lookup<Comment>, StorageError> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, author_id, author_name, author_avatar, text,
                   created_at, like_count
            FROM comments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(comment.into())
    }

    async fn list_comments(&mut self, post_id: Uuid) -> Result<Vec<Comment>, StorageError> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, author_id, author_name, author_avatar, text,
                   created_at, like_count
            FROM comments
            WHERE post_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(post_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(comments)
    }

    async fn count_comments(&mut self, post_id: Uuid) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count)
    }

    async fn delete_comment_cascade(
        &mut self,
        id: Uuid,
    ) -> Result<Lookup<RemovedComment>, StorageError> {
        let post_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT post_id FROM comments WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(post_id) = post_id else {
            return Ok(Lookup::NotFound);
        };

        let comment_likes = sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(Lookup::Found(RemovedComment {
            post_id,
            comment_likes,
        }))
    }

    async fn insert_like(
        &mut self,
        kind: TargetKind,
        target_id: Uuid,
        liker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Like, StorageError> {
        let sql = match kind {
            TargetKind::Post => {
                r#"
                INSERT INTO likes (id, post_id, user_id, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id, post_id AS target_id, user_id, created_at
                "#
            }
            TargetKind::Comment => {
                r#"
                INSERT INTO comment_likes (id, comment_id, user_id, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id, comment_id AS target_id, user_id, created_at
                "#
            }
        };

        let row = sqlx::query_as::<_, LikeRow>(sql)
            .bind(Uuid::new_v4())
            .bind(target_id)
            .bind(liker_id)
            .bind(now)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(row.into_like(kind))
    }

    async fn delete_like(
        &mut self,
        kind: TargetKind,
        target_id: Uuid,
        liker_id: &str,
    ) -> Result<Lookup<Like>, StorageError> {
        let sql = match kind {
            TargetKind::Post => {
                r#"
                DELETE FROM likes
                WHERE post_id = $1 AND user_id = $2
                RETURNING id, post_id AS target_id, user_id, created_at
                "#
            }
            TargetKind::Comment => {
                r#"
                DELETE FROM comment_likes
                WHERE comment_id = $1 AND user_id = $2
                RETURNING id, comment_id AS target_id, user_id, created_at
                "#
            }
        };

        let row = sqlx::query_as::<_, LikeRow>(sql)
            .bind(target_id)
            .bind(liker_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(Lookup::from(row).map(|row| row.into_like(kind)))
    }

    async fn count_likes(
        &mut self,
        kind: TargetKind,
        target_id: Uuid,
    ) -> Result<i64, StorageError> {
        let sql = match kind {
            TargetKind::Post => "SELECT COUNT(*) FROM likes WHERE post_id = $1",
            TargetKind::Comment => "SELECT COUNT(*) FROM comment_likes WHERE comment_id = $1",
        };

        let count: i64 = sqlx::query_scalar(sql)
            .bind(target_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count)
    }

    async fn adjust_counter(
        &mut self,
        counter: Counter,
        target_id: Uuid,
        delta: i64,
    ) -> Result<Lookup<CounterUpdate>, StorageError> {
        // Single read-modify-write; the row lock is held until commit
        let sql = match counter {
            Counter::PostLikes => {
                r#"
                UPDATE posts AS p
                SET like_count = GREATEST(old.like_count + $2, 0)
                FROM (SELECT id, like_count FROM posts WHERE id = $1 FOR UPDATE) AS old
                WHERE p.id = old.id
                RETURNING p.like_count, (old.like_count + $2 < 0) AS clamped
                "#
            }
            Counter::PostComments => {
                r#"
                UPDATE posts AS p
                SET comment_count = GREATEST(old.comment_count + $2, 0)
                FROM (SELECT id, comment_count FROM posts WHERE id = $1 FOR UPDATE) AS old
                WHERE p.id = old.id
                RETURNING p.comment_count, (old.comment_count + $2 < 0) AS clamped
                "#
            }
            Counter::CommentLikes => {
                r#"
                UPDATE comments AS c
                SET like_count = GREATEST(old.like_count + $2, 0)
                FROM (SELECT id, like_count FROM comments WHERE id = $1 FOR UPDATE) AS old
                WHERE c.id = old.id
                RETURNING c.like_count, (old.like_count + $2 < 0) AS clamped
                "#
            }
        };

        let row = sqlx::query_as::<_, (i64, bool)>(sql)
            .bind(target_id)
            .bind(delta)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(match row {
            Some((value, clamped)) => Lookup::Found(CounterUpdate { value, clamped }),
            None => Lookup::NotFound,
        })
    }

    async fn delete_post_cascade(
        &mut self,
        id: Uuid,
    ) -> Result<Lookup<CascadeReport>, StorageError> {
        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        if locked.is_none() {
            return Ok(Lookup::NotFound);
        }

        // Children first; the schema's ON DELETE CASCADE also catches rows
        // committed by writers that were blocked on our locks
        let comment_likes = sqlx::query(
            r#"
            DELETE FROM comment_likes
            WHERE comment_id IN (SELECT id FROM comments WHERE post_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        let comments = sqlx::query("DELETE FROM comments WHERE post_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        let likes = sqlx::query("DELETE FROM likes WHERE post_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        debug!(
            post_id = %id,
            comments,
            likes,
            comment_likes,
            "Post cascade staged"
        );

        Ok(Lookup::Found(CascadeReport {
            comments,
            likes,
            comment_likes,
        }))
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
