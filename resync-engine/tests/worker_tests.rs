//! End-to-end tests: submission through the worker pool to stored rows

mod support;

use resync_common::db::{OperationStatus, OperationType};
use resync_common::events::EventBus;
use resync_engine::db::baselines;
use resync_engine::worker::WorkerPool;
use resync_engine::{SyncEngine, SyncServices};
use serde_json::json;
use std::time::Duration;
use support::{count, fast_settings, test_pool};
use uuid::Uuid;

/// Poll until the operation reaches a terminal status
async fn wait_terminal(engine: &SyncEngine, operation_id: Uuid) -> OperationStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let status = engine.status(operation_id).await.unwrap().status;
        if status.is_terminal() {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "operation {} stuck in {}",
            operation_id,
            status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn start(services: &SyncServices, worker_count: usize) -> WorkerPool {
    WorkerPool::spawn(
        services.controller.clone(),
        worker_count,
        Duration::from_millis(10),
        services.engine.notifier(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submitted_conversation_is_applied() {
    let (_dir, pool) = test_pool().await;
    let services = SyncServices::build(pool.clone(), &fast_settings(), EventBus::new(100)).unwrap();
    let workers = start(&services, 2);

    let operation_id = services
        .engine
        .submit(
            "u1",
            OperationType::ConversationSync,
            json!({"conversation_id": "c1", "messages": [
                {"local_id": "m1", "content": "hello"},
                {"local_id": "m2", "content": "again", "message_type": "ai"}
            ]}),
        )
        .await
        .unwrap();

    assert_eq!(wait_terminal(&services.engine, operation_id).await, OperationStatus::Completed);

    let report = services.engine.status(operation_id).await.unwrap();
    assert_eq!(report.retry_count, 0);
    assert!(report.processed_at.is_some());
    assert_eq!(report.summary.unwrap()["inserted"], json!(2));
    assert_eq!(count(&pool, "messages").await, 2);

    workers.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_deliveries_insert_once() {
    // Given: four workers and the same payload submitted five times
    let (_dir, pool) = test_pool().await;
    let services = SyncServices::build(pool.clone(), &fast_settings(), EventBus::new(100)).unwrap();
    let workers = start(&services, 4);
    let payload = json!({
        "conversation_id": "c1",
        "messages": [{"local_id": "m1", "content": "hello"}]
    });

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(
            services
                .engine
                .submit("u1", OperationType::ConversationSync, payload.clone())
                .await
                .unwrap(),
        );
    }

    // When: all of them are processed
    for id in &ids {
        assert_eq!(wait_terminal(&services.engine, *id).await, OperationStatus::Completed);
    }

    // Then: the message exists exactly once
    assert_eq!(count(&pool, "conversations").await, 1);
    assert_eq!(count(&pool, "messages").await, 1);

    workers.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_baseline_updates_converge() {
    let (_dir, pool) = test_pool().await;
    let services = SyncServices::build(pool.clone(), &fast_settings(), EventBus::new(100)).unwrap();
    let workers = start(&services, 4);

    let mut ids = Vec::new();
    for session_count in 1..=6 {
        ids.push(
            services
                .engine
                .submit(
                    "u1",
                    OperationType::BaselineUpdate,
                    json!({"baseline_type": "voice", "pitch_mean": 100 + session_count, "session_count": session_count}),
                )
                .await
                .unwrap(),
        );
    }

    for id in &ids {
        assert_eq!(wait_terminal(&services.engine, *id).await, OperationStatus::Completed);
    }

    let baseline = baselines::get_baseline(&pool, "u1", "voice").await.unwrap().unwrap();
    assert_eq!(baseline.session_count, 6);
    assert_eq!(count(&pool, "baselines").await, 1);

    workers.shutdown().await;
}

#[tokio::test]
async fn test_undecodable_payload_is_rejected_at_submit() {
    let (_dir, pool) = test_pool().await;
    let services = SyncServices::build(pool.clone(), &fast_settings(), EventBus::new(100)).unwrap();

    let result = services
        .engine
        .submit("u1", OperationType::ConversationSync, json!({"messages": "nope"}))
        .await;

    assert!(result.is_err());
    assert_eq!(count(&pool, "sync_operations").await, 0);
}

#[tokio::test]
async fn test_shutdown_stops_idle_workers() {
    let (_dir, pool) = test_pool().await;
    let services = SyncServices::build(pool, &fast_settings(), EventBus::new(100)).unwrap();
    let workers = start(&services, 3);
    assert_eq!(workers.worker_count(), 3);

    let token = workers.cancellation_token();
    tokio::time::timeout(Duration::from_secs(5), workers.shutdown())
        .await
        .expect("workers did not stop");
    assert!(token.is_cancelled());
}
