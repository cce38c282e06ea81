//! Integration Tests: Consistency Supervisor
//!
//! Coverage:
//! - Transient conflicts are retried and applied exactly once
//! - Exhausted retries surface ConflictExhausted with no partial writes
//! - Pool exhaustion surfaces ResourceUnavailable
//! - Calls dropped before commit leave no trace
//! - Likes racing a post deletion end in TargetNotFound, never orphans

mod common;

use common::{app, app_with, fast_retry, new_comment, new_post};
use engagement_service::domain::TargetKind;
use engagement_service::storage::{MemoryGateway, StorageError, StorageGateway};
use engagement_service::EngagementError;
use std::time::Duration;

#[tokio::test]
async fn test_conflict_retried_once_applied() {
    let app = app();
    let post = app.service.create_post(new_post("author")).await.unwrap();

    app.gateway.fail_next_commits(
        2,
        StorageError::SerializationFailure("could not serialize".into()),
    );
    let outcome = app
        .service
        .like(TargetKind::Post, post.id, "u1")
        .await
        .unwrap();
    assert_eq!(outcome.like_count, 1);

    let audit = app
        .service
        .audit_counters(TargetKind::Post, post.id)
        .await
        .unwrap();
    assert_eq!(audit.live_likes, 1);
    assert!(audit.is_consistent());
}

#[tokio::test]
async fn test_conflicts_exhausted() {
    let app = app();
    let post = app.service.create_post(new_post("author")).await.unwrap();

    app.gateway.fail_next_commits(
        3,
        StorageError::SerializationFailure("deadlock detected".into()),
    );
    let result = app.service.like(TargetKind::Post, post.id, "u1").await;
    assert_eq!(
        result.unwrap_err(),
        EngagementError::ConflictExhausted {
            operation: "like",
            attempts: 3
        }
    );

    let post = app.service.get_post(post.id).await.unwrap();
    assert_eq!(post.like_count, 0);

    // Nothing was left behind, so the user can like normally afterwards
    let outcome = app
        .service
        .like(TargetKind::Post, post.id, "u1")
        .await
        .unwrap();
    assert_eq!(outcome.like_count, 1);
}

#[tokio::test]
async fn test_non_transient_fault_not_retried() {
    let app = app();
    let post = app.service.create_post(new_post("author")).await.unwrap();

    app.gateway.fail_next_commits(
        1,
        StorageError::Connection("connection reset by peer".into()),
    );
    let result = app
        .service
        .add_comment(post.id, new_comment("c", "hello"))
        .await;
    assert!(matches!(result, Err(EngagementError::StorageFault(_))));
    assert_eq!(
        app.service.get_post(post.id).await.unwrap().comment_count,
        0
    );
}

#[tokio::test]
async fn test_pool_exhaustion_surfaces_resource_unavailable() {
    let gateway = MemoryGateway::with_limits(1, Duration::from_millis(20));
    let app = app_with(gateway.clone(), fast_retry(3));
    let post = app.service.create_post(new_post("author")).await.unwrap();

    let held = gateway.begin().await.unwrap();
    let result = app.service.like(TargetKind::Post, post.id, "u1").await;
    assert!(matches!(
        result,
        Err(EngagementError::ResourceUnavailable(_))
    ));
    assert!(matches!(
        app.service.ping().await,
        Err(EngagementError::ResourceUnavailable(_))
    ));

    held.rollback().await.unwrap();
    assert!(app.service.ping().await.is_ok());
    assert_eq!(app.service.get_post(post.id).await.unwrap().like_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_likes_racing_post_deletion() {
    let app = app();
    let post = app.service.create_post(new_post("author")).await.unwrap();
    let comment = app
        .service
        .add_comment(post.id, new_comment("c", "hi"))
        .await
        .unwrap()
        .comment;

    let mut handles = Vec::new();
    for i in 0..30 {
        let service = app.service.clone();
        let (post_id, comment_id) = (post.id, comment.id);
        handles.push(tokio::spawn(async move {
            let user = format!("user-{}", i);
            let kind = if i % 2 == 0 {
                TargetKind::Post
            } else {
                TargetKind::Comment
            };
            let target = if i % 2 == 0 { post_id } else { comment_id };
            service.like(kind, target, &user).await
        }));
    }

    let deleter = {
        let service = app.service.clone();
        let post_id = post.id;
        tokio::spawn(async move { service.delete_post(post_id).await })
    };

    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) | Err(EngagementError::TargetNotFound { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    deleter.await.unwrap().unwrap();

    assert_eq!(app.gateway.rows_referencing_post(post.id).await, 0);
    assert_eq!(app.gateway.orphan_count().await, 0);
    assert!(matches!(
        app.service.like(TargetKind::Post, post.id, "late").await,
        Err(EngagementError::TargetNotFound { .. })
    ));
}

#[tokio::test]
async fn test_like_aborted_before_commit_rolls_back() {
    let app = app();
    let post = app.service.create_post(new_post("author")).await.unwrap();

    let reached_commit = app.gateway.stall_next_commit();
    let in_flight = {
        let service = app.service.clone();
        let post_id = post.id;
        tokio::spawn(async move {
            service.like(TargetKind::Post, post_id, "u1").await
        })
    };

    // Counter bumped and like row written, commit not yet applied
    reached_commit.notified().await;
    in_flight.abort();
    assert!(in_flight.await.unwrap_err().is_cancelled());

    assert_eq!(app.service.get_post(post.id).await.unwrap().like_count, 0);
    let audit = app
        .service
        .audit_counters(TargetKind::Post, post.id)
        .await
        .unwrap();
    assert_eq!(audit.live_likes, 0);
    assert!(audit.is_consistent());

    let outcome = app
        .service
        .like(TargetKind::Post, post.id, "u1")
        .await
        .unwrap();
    assert!(outcome.applied);
    assert_eq!(outcome.like_count, 1);
}

#[tokio::test]
async fn test_add_comment_timed_out_before_commit_rolls_back() {
    let app = app();
    let post = app.service.create_post(new_post("author")).await.unwrap();

    let _reached_commit = app.gateway.stall_next_commit();
    let result = tokio::time::timeout(
        Duration::from_millis(50),
        app.service.add_comment(post.id, new_comment("c", "hello")),
    )
    .await;
    assert!(result.is_err());

    assert_eq!(
        app.service.get_post(post.id).await.unwrap().comment_count,
        0
    );
    assert!(app.service.list_comments(post.id).await.unwrap().is_empty());
    assert!(app
        .service
        .audit_counters(TargetKind::Post, post.id)
        .await
        .unwrap()
        .is_consistent());
}
