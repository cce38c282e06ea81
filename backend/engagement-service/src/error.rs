/// Error types for engagement-service
///
/// Business outcomes (`AlreadyLiked`, `NotLiked`, `TargetNotFound`) are
/// expected results of racing clients and are never retried. Infrastructure
/// failures carry a message only; the storage layer decides what is transient.
use crate::domain::TargetKind;
use crate::storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngagementError {
    #[error("{kind} {target_id} is already liked by this user")]
    AlreadyLiked { kind: TargetKind, target_id: Uuid },

    #[error("{kind} {target_id} is not liked by this user")]
    NotLiked { kind: TargetKind, target_id: Uuid },

    #[error("{kind} {id} not found")]
    TargetNotFound { kind: TargetKind, id: Uuid },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transient write conflict; retried by the supervisor and never
    /// surfaced to callers directly
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("{operation} gave up after {attempts} conflicting attempts")]
    ConflictExhausted {
        operation: &'static str,
        attempts: u32,
    },

    #[error("Storage unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Storage fault: {0}")]
    StorageFault(String),
}

impl EngagementError {
    /// Only write conflicts are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, EngagementError::Conflict(_))
    }

    /// Expected results of concurrent clients rather than failures
    pub fn is_business_outcome(&self) -> bool {
        matches!(
            self,
            EngagementError::AlreadyLiked { .. }
                | EngagementError::NotLiked { .. }
                | EngagementError::TargetNotFound { .. }
        )
    }

    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            EngagementError::AlreadyLiked { .. } => "already_liked",
            EngagementError::NotLiked { .. } => "not_liked",
            EngagementError::TargetNotFound { .. } => "target_not_found",
            EngagementError::InvalidInput(_) => "invalid_input",
            EngagementError::Conflict(_) => "conflict",
            EngagementError::ConflictExhausted { .. } => "conflict_exhausted",
            EngagementError::ResourceUnavailable(_) => "resource_unavailable",
            EngagementError::StorageFault(_) => "storage_fault",
        }
    }
}

impl From<StorageError> for EngagementError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SerializationFailure(msg) => EngagementError::Conflict(msg),
            StorageError::PoolExhausted(msg) => EngagementError::ResourceUnavailable(msg),
            other => EngagementError::StorageFault(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for EngagementError {
    fn from(err: validator::ValidationErrors) -> Self {
        EngagementError::InvalidInput(err.to_string())
    }
}

/// Result type alias for engagement operations
pub type EngagementResult<T> = Result<T, EngagementError>;
