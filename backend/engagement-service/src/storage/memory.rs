use super::{CounterUpdate, Lookup, StorageError, StorageGateway, StorageTx};
use crate::domain::{
    CascadeReport, Comment, Counter, Like, NewComment, NewPost, Post, PostUpdate, RemovedComment,
    TargetKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

const DEFAULT_CONNECTIONS: usize = 16;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct Tables {
    posts: HashMap<Uuid, Post>,
    comments: HashMap<Uuid, Comment>,
    likes: BTreeMap<(Uuid, String), Like>,
    comment_likes: BTreeMap<(Uuid, String), Like>,
}

impl Tables {
    fn like_table(&self, kind: TargetKind) -> &BTreeMap<(Uuid, String), Like> {
        match kind {
            TargetKind::Post => &self.likes,
            TargetKind::Comment => &self.comment_likes,
        }
    }

    fn like_table_mut(&mut self, kind: TargetKind) -> &mut BTreeMap<(Uuid, String), Like> {
        match kind {
            TargetKind::Post => &mut self.likes,
            TargetKind::Comment => &mut self.comment_likes,
        }
    }

    fn target_exists(&self, kind: TargetKind, id: Uuid) -> bool {
        match kind {
            TargetKind::Post => self.posts.contains_key(&id),
            TargetKind::Comment => self.comments.contains_key(&id),
        }
    }

    fn counter_slot(&mut self, counter: Counter, id: Uuid) -> Option<&mut i64> {
        match counter {
            Counter::PostLikes => self.posts.get_mut(&id).map(|p| &mut p.like_count),
            Counter::PostComments => self.posts.get_mut(&id).map(|p| &mut p.comment_count),
            Counter::CommentLikes => self.comments.get_mut(&id).map(|c| &mut c.like_count),
        }
    }

    /// Drop every like row keyed on `target_id`
    fn remove_likes_of(&mut self, kind: TargetKind, target_id: Uuid) -> u64 {
        let table = self.like_table_mut(kind);
        let before = table.len();
        table.retain(|(id, _), _| *id != target_id);
        (before - table.len()) as u64
    }
}

/// Failures queued by tests
#[derive(Default)]
struct Faults {
    commit_failures: Mutex<VecDeque<StorageError>>,
    stalled_commits: Mutex<VecDeque<Arc<Notify>>>,
    scan_failures: Mutex<VecDeque<StorageError>>,
    poisoned_posts: Mutex<HashSet<Uuid>>,
}

/// In-process storage gateway
///
/// Transactions are fully serialized: each one holds the table lock from
/// `begin` until commit or rollback and works on a private copy that is
/// published on commit. A semaphore stands in for the connection pool, so
/// callers that cannot get a permit within the acquire timeout fail with
/// `PoolExhausted`.
#[derive(Clone)]
pub struct MemoryGateway {
    tables: Arc<AsyncMutex<Tables>>,
    connections: Arc<Semaphore>,
    acquire_timeout: Duration,
    faults: Arc<Faults>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CONNECTIONS, DEFAULT_ACQUIRE_TIMEOUT)
    }

    pub fn with_limits(max_connections: usize, acquire_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(AsyncMutex::new(Tables::default())),
            connections: Arc::new(Semaphore::new(max_connections)),
            acquire_timeout,
            faults: Arc::new(Faults::default()),
        }
    }

    /// Make the next `times` commits fail with `err`
    pub fn fail_next_commits(&self, times: usize, err: StorageError) {
        let mut queue = self.faults.commit_failures.lock();
        for _ in 0..times {
            queue.push_back(err.clone());
        }
    }

    /// Park the next commit forever; the returned handle is notified once it is reached
    pub fn stall_next_commit(&self) -> Arc<Notify> {
        let reached = Arc::new(Notify::new());
        self.faults.stalled_commits.lock().push_back(reached.clone());
        reached
    }

    /// Make the next expired-post scan fail with `err`
    pub fn fail_next_scan(&self, err: StorageError) {
        self.faults.scan_failures.lock().push_back(err);
    }

    /// Make every cascade delete of `post_id` fail
    pub fn poison_post(&self, post_id: Uuid) {
        self.faults.poisoned_posts.lock().insert(post_id);
    }

    pub fn heal_post(&self, post_id: Uuid) {
        self.faults.poisoned_posts.lock().remove(&post_id);
    }

    /// Committed post count
    pub async fn post_count(&self) -> usize {
        self.tables.lock().await.posts.len()
    }

    /// Committed rows that still reference `post_id`, directly or through a comment
    pub async fn rows_referencing_post(&self, post_id: Uuid) -> usize {
        let tables = self.tables.lock().await;
        let comment_ids: HashSet<Uuid> = tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .map(|c| c.id)
            .collect();

        comment_ids.len()
            + tables.likes.keys().filter(|(id, _)| *id == post_id).count()
            + tables
                .comment_likes
                .keys()
                .filter(|(id, _)| comment_ids.contains(id))
                .count()
    }

    /// Committed rows whose parent no longer exists
    pub async fn orphan_count(&self) -> usize {
        let tables = self.tables.lock().await;
        tables
            .comments
            .values()
            .filter(|c| !tables.posts.contains_key(&c.post_id))
            .count()
            + tables
                .likes
                .keys()
                .filter(|(id, _)| !tables.posts.contains_key(id))
                .count()
            + tables
                .comment_likes
                .keys()
                .filter(|(id, _)| !tables.comments.contains_key(id))
                .count()
    }
}

#[async_trait]
impl StorageGateway for MemoryGateway {
    async fn begin(&self) -> Result<Box<dyn StorageTx>, StorageError> {
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            self.connections.clone().acquire_owned(),
        )
        .await
        .map_err(|_| {
            StorageError::PoolExhausted(format!(
                "no connection available within {:?}",
                self.acquire_timeout
            ))
        })?
        .map_err(|_| {
            StorageError::PoolExhausted("connection pool closed".to_string())
        })?;

        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(MemoryTx {
            _permit: permit,
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn expired_post_ids(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
        let injected = self.faults.scan_failures.lock().pop_front();
        if let Some(err) = injected {
            return Err(err);
        }

        let tables = self.tables.lock().await;
        let mut expired: Vec<(DateTime<Utc>, Uuid)> = tables
            .posts
            .values()
            .filter(|p| p.created_at < cutoff)
            .map(|p| (p.created_at, p.id))
            .collect();
        expired.sort();

        Ok(expired.into_iter().map(|(_, id)| id).collect())
    }
}

/// Open in-memory transaction; dropping it without commit discards its writes
pub struct MemoryTx {
    _permit: OwnedSemaphorePermit,
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<Faults>,
}

fn post_fk() -> StorageError {
    StorageError::ForeignKeyViolation {
        constraint: "comments_post_id_fkey".to_string(),
    }
}

#[async_trait]
impl StorageTx for MemoryTx {
    async fn insert_post(
        &mut self,
        post: &NewPost,
        now: DateTime<Utc>,
    ) -> Result<Post, StorageError> {
        let post = Post {
            id: Uuid::new_v4(),
            author_id: post.author_id.clone(),
            author_name: post.author_name.clone(),
            author_avatar: post.author_avatar.clone(),
            content: post.content.clone(),
            media_url: post.media_url.clone(),
            created_at: now,
            updated_at: now,
            like_count: 0,
            comment_count: 0,
        };
        self.working.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update_post(
        &mut self,
        id: Uuid,
        update: &PostUpdate,
        now: DateTime<Utc>,
    ) -> Result<Lookup<Post>, StorageError> {
        let post = self.working.posts.get_mut(&id).map(|post| {
            post.content = update.content.clone();
            post.media_url = update.media_url.clone();
            post.updated_at = now;
            post.clone()
        });
        Ok(post.into())
    }

    async fn find_post(&mut self, id: Uuid) -> Result<Lookup<Post>, StorageError> {
        Ok(self.working.posts.get(&id).cloned().into())
    }

    async fn list_posts(&mut self, limit: i64, offset: i64) -> Result<Vec<Post>, StorageError> {
        let mut posts: Vec<Post> = self.working.posts.values().cloned().collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(posts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_posts(&mut self) -> Result<i64, StorageError> {
        Ok(self.working.posts.len() as i64)
    }

    async fn insert_comment(
        &mut self,
        post_id: Uuid,
        comment: &NewComment,
        now: DateTime<Utc>,
    ) -> Result<Comment, StorageError> {
        if !self.working.posts.contains_key(&post_id) {
            return Err(post_fk());
        }

        let comment = Comment {
            id: Uuid::new_v4(),
            post_id,
            author_id: comment.author_id.clone(),
            author_name: comment.author_name.clone(),
            author_avatar: comment.author_avatar.clone(),
            text: comment.text.clone(),
            created_at: now,
            like_count: 0,
        };
        self.working.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn find_comment(&mut self, id: Uuid) -> Result<Lookup<Comment>, StorageError> {
        Ok(self.working.comments.get(&id).cloned().into())
    }

    async fn list_comments(&mut self, post_id: Uuid) -> Result<Vec<Comment>, StorageError> {
        let mut comments: Vec<Comment> = self
            .working
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn count_comments(&mut self, post_id: Uuid) -> Result<i64, StorageError> {
        Ok(self
            .working
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .count() as i64)
    }

    async fn delete_comment_cascade(
        &mut self,
        id: Uuid,
    ) -> Result<Lookup<RemovedComment>, StorageError> {
        let Some(comment) = self.working.comments.remove(&id) else {
            return Ok(Lookup::NotFound);
        };

        let comment_likes = self.working.remove_likes_of(TargetKind::Comment, id);
        Ok(Lookup::Found(RemovedComment {
            post_id: comment.post_id,
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
        if !self.working.target_exists(kind, target_id) {
            return Err(StorageError::ForeignKeyViolation {
                constraint: format!("{}_likes_target_fkey", kind),
            });
        }

        let key = (target_id, liker_id.to_string());
        let table = self.working.like_table_mut(kind);
        if table.contains_key(&key) {
            return Err(StorageError::UniqueViolation {
                constraint: format!("{}_likes_target_user_key", kind),
            });
        }

        let like = Like {
            id: Uuid::new_v4(),
            target_kind: kind,
            target_id,
            liker_id: liker_id.to_string(),
            created_at: now,
        };
        table.insert(key, like.clone());
        Ok(like)
    }

    async fn delete_like(
        &mut self,
        kind: TargetKind,
        target_id: Uuid,
        liker_id: &str,
    ) -> Result<Lookup<Like>, StorageError> {
        let key = (target_id, liker_id.to_string());
        Ok(self.working.like_table_mut(kind).remove(&key).into())
    }

    async fn count_likes(
        &mut self,
        kind: TargetKind,
        target_id: Uuid,
    ) -> Result<i64, StorageError> {
        Ok(self
            .working
            .like_table(kind)
            .keys()
            .filter(|(id, _)| *id == target_id)
            .count() as i64)
    }

    async fn adjust_counter(
        &mut self,
        counter: Counter,
        target_id: Uuid,
        delta: i64,
    ) -> Result<Lookup<CounterUpdate>, StorageError> {
        let update = self.working.counter_slot(counter, target_id).map(|slot| {
            let raw = *slot + delta;
            *slot = raw.max(0);
            CounterUpdate {
                value: *slot,
                clamped: raw < 0,
            }
        });
        Ok(update.into())
    }

    async fn delete_post_cascade(
        &mut self,
        id: Uuid,
    ) -> Result<Lookup<CascadeReport>, StorageError> {
        if self.faults.poisoned_posts.lock().contains(&id) {
            return Err(StorageError::Database(format!(
                "injected cascade failure for post {}",
                id
            )));
        }

        if !self.working.posts.contains_key(&id) {
            return Ok(Lookup::NotFound);
        }

        let comment_ids: Vec<Uuid> = self
            .working
            .comments
            .values()
            .filter(|c| c.post_id == id)
            .map(|c| c.id)
            .collect();

        let mut report = CascadeReport::default();
        for comment_id in &comment_ids {
            report.comment_likes += self
                .working
                .remove_likes_of(TargetKind::Comment, *comment_id);
            self.working.comments.remove(comment_id);
        }
        report.comments = comment_ids.len() as u64;
        report.likes = self.working.remove_likes_of(TargetKind::Post, id);
        self.working.posts.remove(&id);

        Ok(Lookup::Found(report))
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let MemoryTx {
            mut guard,
            working,
            faults,
            ..
        } = *self;

        let stall = faults.stalled_commits.lock().pop_front();
        if let Some(reached) = stall {
            reached.notify_one();
            std::future::pending::<()>().await;
        }

        let injected = faults.commit_failures.lock().pop_front();
        if let Some(err) = injected {
            return Err(err);
        }

        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}
