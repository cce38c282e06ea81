/// Engagement Service Library
///
/// Posts, comments, and likes with consistent denormalized counters, plus
/// time-based retention of old posts.
///
/// # Modules
///
/// - `domain`: Posts, comments, likes, and operation results
/// - `storage`: Transactional storage gateway (PostgreSQL and in-memory)
/// - `services`: Ledger, counters, transaction supervisor, post/comment logic
/// - `workers`: Retention sweeper and its scheduler
/// - `service`: Facade wiring the components together
/// - `config`: Configuration management
/// - `metrics`: Prometheus collectors and the `/metrics` handler
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod service;
pub mod services;
pub mod storage;
pub mod workers;

pub use error::{EngagementError, EngagementResult};
pub use service::EngagementService;
