//! Integration tests for the Registry Actor.
//!
//! These tests verify the registry works correctly as a complete system,
//! through spawn_registry() and the RegistryHandle interface.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::time::Duration;

use hicom_core::{Classification, PeerAddress};
use hicomd::registry::{spawn_registry, RegistryConfig, RegistryError};
use tokio::time::sleep;

// ============================================================================
// Test Helpers
// ============================================================================

fn peer(addr: &str) -> PeerAddress {
    addr.parse().expect("valid test address")
}

fn mismatch(text: &str) -> Classification {
    Classification::Mismatch {
        description: text.to_string(),
    }
}

fn small_registry(max_records: usize) -> RegistryConfig {
    RegistryConfig {
        max_records,
        ..RegistryConfig::default()
    }
}

// ============================================================================
// Basic Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_basic_lifecycle() {
    let handle = spawn_registry(RegistryConfig::default());

    let id = handle
        .insert(peer("192.168.0.10"))
        .await
        .expect("insert should succeed");

    let view = handle
        .find(peer("192.168.0.10"))
        .await
        .unwrap()
        .expect("record should be found");
    assert_eq!(view.id, id);
    assert!(view.healthy);
    assert!(view.last_error.is_empty());
    assert!(view.connected);

    handle.update(id, mismatch("junk")).await.unwrap();
    let view = handle.get(id).await.unwrap();
    assert!(!view.healthy);
    assert_eq!(view.last_error, "junk");
    assert_eq!(view.payloads, 1);
    assert_eq!(view.failures, 1);

    handle.update(id, Classification::Match).await.unwrap();
    let view = handle.get(id).await.unwrap();
    assert!(view.healthy);
    // The last error is kept for diagnosis
    assert_eq!(view.last_error, "junk");

    handle.mark_disconnected(id).await.unwrap();
    assert!(!handle.get(id).await.unwrap().connected);
    assert!(handle.is_connected());
}

#[tokio::test]
async fn test_ipv4_mapped_lookup() {
    let handle = spawn_registry(RegistryConfig::default());
    handle.insert(peer("::ffff:10.0.0.7")).await.unwrap();

    let view = handle.find(peer("10.0.0.7")).await.unwrap();
    assert!(view.is_some());
}

#[tokio::test]
async fn test_ids_are_monotonic() {
    let handle = spawn_registry(RegistryConfig::default());

    let mut previous = None;
    for i in 0..10 {
        let id = handle.insert(peer(&format!("10.0.0.{i}"))).await.unwrap();
        if let Some(prev) = previous {
            assert!(id > prev, "{id} should follow {prev}");
        }
        previous = Some(id);
    }
    assert_eq!(handle.len().await, 10);
}

#[tokio::test]
async fn test_unknown_id_errors() {
    let handle = spawn_registry(RegistryConfig::default());
    let id = handle.insert(peer("10.0.0.1")).await.unwrap();
    let missing = id.next();

    assert_eq!(
        handle.update(missing, Classification::Match).await,
        Err(RegistryError::ClientNotFound(missing))
    );
    assert_eq!(
        handle.mark_disconnected(missing).await,
        Err(RegistryError::ClientNotFound(missing))
    );
    assert!(handle.get(missing).await.is_none());
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_and_updates() {
    let handle = spawn_registry(RegistryConfig::default());

    let mut tasks = Vec::new();
    for i in 0..50u8 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let id = handle.insert(peer(&format!("10.1.0.{i}"))).await.unwrap();
            for _ in 0..10 {
                handle.update(id, Classification::Match).await.unwrap();
            }
            handle.update(id, mismatch("last")).await.unwrap();
            id
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    let all = handle.all().await;
    assert_eq!(all.len(), 50);
    for view in all {
        assert!(!view.healthy);
        assert_eq!(view.payloads, 11);
        assert_eq!(view.failures, 1);
    }
}

// ============================================================================
// Retention Tests
// ============================================================================

#[tokio::test]
async fn test_full_registry_rejects_live_peers() {
    let handle = spawn_registry(small_registry(2));
    handle.insert(peer("10.0.0.1")).await.unwrap();
    handle.insert(peer("10.0.0.2")).await.unwrap();

    assert_eq!(
        handle.insert(peer("10.0.0.3")).await,
        Err(RegistryError::RegistryFull { max: 2 })
    );
    assert_eq!(handle.len().await, 2);
}

#[tokio::test]
async fn test_full_registry_evicts_oldest_disconnected() {
    let handle = spawn_registry(small_registry(2));
    let first = handle.insert(peer("10.0.0.1")).await.unwrap();
    let second = handle.insert(peer("10.0.0.2")).await.unwrap();

    handle.mark_disconnected(second).await.unwrap();
    handle.mark_disconnected(first).await.unwrap();

    let third = handle.insert(peer("10.0.0.3")).await.unwrap();

    // The oldest record among the disconnected ones goes first
    assert!(handle.get(first).await.is_none());
    assert!(handle.get(second).await.is_some());
    assert!(handle.get(third).await.is_some());
    assert_eq!(handle.len().await, 2);
}

#[tokio::test]
async fn test_cleanup_removes_only_expired_disconnected() {
    let handle = spawn_registry(RegistryConfig {
        retention: Duration::ZERO,
        ..RegistryConfig::default()
    });

    let gone = handle.insert(peer("10.0.0.1")).await.unwrap();
    let live = handle.insert(peer("10.0.0.2")).await.unwrap();
    handle.mark_disconnected(gone).await.unwrap();

    sleep(Duration::from_millis(20)).await;
    handle.cleanup_stale().await;

    assert!(handle.get(gone).await.is_none());
    assert!(handle.get(live).await.is_some());
    assert!(handle.find(peer("10.0.0.1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cleanup_keeps_recent_records() {
    let handle = spawn_registry(RegistryConfig::default());
    let id = handle.insert(peer("10.0.0.1")).await.unwrap();
    handle.mark_disconnected(id).await.unwrap();

    handle.cleanup_stale().await;
    assert!(handle.get(id).await.is_some());
}

#[tokio::test]
async fn test_background_cleanup_runs() {
    let handle = spawn_registry(RegistryConfig {
        max_records: 16,
        retention: Duration::ZERO,
        cleanup_interval: Duration::from_millis(20),
    });

    let id = handle.insert(peer("10.0.0.1")).await.unwrap();
    handle.mark_disconnected(id).await.unwrap();

    let start = tokio::time::Instant::now();
    while handle.len().await > 0 {
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "background cleanup never removed the record"
        );
        sleep(Duration::from_millis(10)).await;
    }
}
