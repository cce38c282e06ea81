//! Storage gateway contract
//!
//! Every engagement mutation runs inside a single [`StorageTx`]. Operations on
//! a transaction only become visible to other transactions after `commit`;
//! dropping or rolling back a transaction discards them. Two backends
//! implement the contract: [`PgGateway`] for PostgreSQL and
//! [`MemoryGateway`] for embedded use and tests.

mod memory;
mod postgres;

pub use memory::MemoryGateway;
pub use postgres::PgGateway;

use crate::domain::{
    CascadeReport, Comment, Counter, Like, NewComment, NewPost, Post, PostUpdate, RemovedComment,
    TargetKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Outcome of a keyed read or write that may find nothing
///
/// Absence is a regular result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::NotFound => Lookup::NotFound,
        }
    }

    pub fn found_or_else<E>(self, err: impl FnOnce() -> E) -> Result<T, E> {
        match self {
            Lookup::Found(value) => Ok(value),
            Lookup::NotFound => Err(err()),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Lookup::Found(value),
            None => Lookup::NotFound,
        }
    }
}

/// New value of an atomically adjusted counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterUpdate {
    pub value: i64,
    /// The delta would have taken the counter below zero
    pub clamped: bool,
}

/// Transaction isolation requested for every gateway transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            other => Err(format!("unknown isolation level: {}", other)),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Storage failures, classified so callers can tell conflicts from faults
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Unique constraint violation: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Foreign key constraint violation: {constraint}")]
    ForeignKeyViolation { constraint: String },

    /// Serialization failure or deadlock; the whole transaction may be retried
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::SerializationFailure(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if db_pool::is_pool_exhausted(&err) {
            return StorageError::PoolExhausted(err.to_string());
        }

        match err {
            sqlx::Error::Database(db_err) => {
                // 40001 serialization_failure, 40P01 deadlock_detected
                if matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")) {
                    return StorageError::SerializationFailure(db_err.message().to_string());
                }

                let constraint = db_err.constraint().unwrap_or_default().to_string();
                match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => {
                        StorageError::UniqueViolation { constraint }
                    }
                    sqlx::error::ErrorKind::ForeignKeyViolation => {
                        StorageError::ForeignKeyViolation { constraint }
                    }
                    _ => StorageError::Database(db_err.message().to_string()),
                }
            }
            sqlx::Error::Io(e) => StorageError::Connection(e.to_string()),
            sqlx::Error::Tls(e) => StorageError::Connection(e.to_string()),
            other => StorageError::Database(other.to_string()),
        }
    }
}

/// Source of storage transactions plus the one read that runs outside them
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Open a transaction, waiting a bounded time for a connection
    async fn begin(&self) -> Result<Box<dyn StorageTx>, StorageError>;

    /// Ids of posts created strictly before `cutoff`, oldest first
    async fn expired_post_ids(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError>;
}

/// One open storage transaction
#[async_trait]
pub trait StorageTx: Send {
    async fn insert_post(
        &mut self,
        post: &NewPost,
        now: DateTime<Utc>,
    ) -> Result<Post, StorageError>;

    async fn update_post(
        &mut self,
        id: Uuid,
        update: &PostUpdate,
        now: DateTime<Utc>,
    ) -> Result<Lookup<Post>, StorageError>;

    async fn find_post(&mut self, id: Uuid) -> Result<Lookup<Post>, StorageError>;

    /// Newest first, ties broken by id
    async fn list_posts(&mut self, limit: i64, offset: i64) -> Result<Vec<Post>, StorageError>;

    async fn count_posts(&mut self) -> Result<i64, StorageError>;

    /// Fails with `ForeignKeyViolation` when the post does not exist
    async fn insert_comment(
        &mut self,
        post_id: Uuid,
        comment: &NewComment,
        now: DateTime<Utc>,
    ) -> Result<Comment, StorageError>;

    async fn find_comment(&mut self, id: Uuid) -> Result<Lookup<Comment>, StorageError>;

    /// Newest first
    async fn list_comments(&mut self, post_id: Uuid) -> Result<Vec<Comment>, StorageError>;

    async fn count_comments(&mut self, post_id: Uuid) -> Result<i64, StorageError>;

    /// Remove a comment and its likes
    async fn delete_comment_cascade(
        &mut self,
        id: Uuid,
    ) -> Result<Lookup<RemovedComment>, StorageError>;

    /// Fails with `UniqueViolation` on a duplicate (target, liker) pair and
    /// `ForeignKeyViolation` when the target does not exist
    async fn insert_like(
        &mut self,
        kind: TargetKind,
        target_id: Uuid,
        liker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Like, StorageError>;

    async fn delete_like(
        &mut self,
        kind: TargetKind,
        target_id: Uuid,
        liker_id: &str,
    ) -> Result<Lookup<Like>, StorageError>;

    async fn count_likes(&mut self, kind: TargetKind, target_id: Uuid)
        -> Result<i64, StorageError>;

    /// Add `delta` to a counter in one atomic step, flooring at zero
    ///
    /// Locks the owning row until the transaction ends.
    async fn adjust_counter(
        &mut self,
        counter: Counter,
        target_id: Uuid,
        delta: i64,
    ) -> Result<Lookup<CounterUpdate>, StorageError>;

    /// Remove a post with its comments, comment likes, and likes
    async fn delete_post_cascade(
        &mut self,
        id: Uuid,
    ) -> Result<Lookup<CascadeReport>, StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_helpers() {
        let found: Lookup<i64> = Some(3).into();
        assert!(found.is_found());
        assert_eq!(found.map(|v| v * 2), Lookup::Found(6));
        assert_eq!(found.found_or_else(|| "missing"), Ok(3));

        let missing: Lookup<i64> = None.into();
        assert_eq!(missing.found_or_else(|| "missing"), Err("missing"));
        assert_eq!(missing.into_option(), None);
    }

    #[test]
    fn test_isolation_level_parsing() {
        assert_eq!(
            "read_committed".parse::<IsolationLevel>(),
            Ok(IsolationLevel::ReadCommitted)
        );
        assert_eq!(
            "Serializable".parse::<IsolationLevel>(),
            Ok(IsolationLevel::Serializable)
        );
        assert_eq!(
            "repeatable read".parse::<IsolationLevel>(),
            Ok(IsolationLevel::RepeatableRead)
        );
        assert!("snapshot".parse::<IsolationLevel>().is_err());
    }

    #[test]
    fn test_pool_errors_classified() {
        assert!(matches!(
            StorageError::from(sqlx::Error::PoolTimedOut),
            StorageError::PoolExhausted(_)
        ));
        assert!(matches!(
            StorageError::from(sqlx::Error::RowNotFound),
            StorageError::Database(_)
        ));
        let deadlock = StorageError::SerializationFailure("deadlock".into());
        assert!(deadlock.is_transient());
        let timeout = StorageError::PoolExhausted("timeout".into());
        assert!(!timeout.is_transient());
    }
}
