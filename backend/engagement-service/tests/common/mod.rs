//! Shared fixtures for engagement-service integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use engagement_service::clock::{Clock, ManualClock};
use engagement_service::domain::{NewComment, NewPost};
use engagement_service::storage::{MemoryGateway, StorageGateway};
use engagement_service::EngagementService;
use resilience::RetryConfig;
use std::sync::Arc;
use std::time::Duration;

pub struct TestApp {
    pub service: Arc<EngagementService>,
    pub gateway: MemoryGateway,
    pub clock: Arc<ManualClock>,
}

/// Fixed start instant so timestamps are reproducible
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

pub fn fast_retry(attempts: u32) -> RetryConfig {
    RetryConfig {
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
        jitter: false,
        ..resilience::transaction_retry()
    }
    .with_max_attempts(attempts)
}

pub fn app_with(gateway: MemoryGateway, retry: RetryConfig) -> TestApp {
    let clock = Arc::new(ManualClock::new(epoch()));
    let shared: Arc<dyn StorageGateway> = Arc::new(gateway.clone());
    let as_clock: Arc<dyn Clock> = clock.clone();

    TestApp {
        service: Arc::new(EngagementService::new(shared, as_clock, retry, 2)),
        gateway,
        clock,
    }
}

pub fn app() -> TestApp {
    app_with(MemoryGateway::new(), fast_retry(3))
}

pub fn new_post(author: &str) -> NewPost {
    NewPost {
        author_id: author.to_string(),
        author_name: format!("{} name", author),
        author_avatar: format!("https://cdn.example.com/{}.png", author),
        content: format!("post by {}", author),
        media_url: None,
    }
}

pub fn new_comment(author: &str, text: &str) -> NewComment {
    NewComment {
        author_id: author.to_string(),
        author_name: format!("{} name", author),
        author_avatar: format!("https://cdn.example.com/{}.png", author),
        text: text.to_string(),
    }
}
