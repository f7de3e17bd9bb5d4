// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use conductor_core::test_support::NodeBuilder;
use conductor_core::{Backoff, ConductorId, FakeClock};
use conductor_driver::{fake_driver, DriverRegistry};
use conductor_fsm::{ProvisionEvent, ProvisionState};
use conductor_store::memory::InMemoryNodeStore;
use conductor_store::NodeStore;

use super::pool::BoundedWorkerPool;
use super::task::TaskManager;

fn registry() -> Arc<DriverRegistry> {
    let registry = DriverRegistry::new();
    registry.register(fake_driver("fake-hardware")).unwrap();
    Arc::new(registry)
}

fn manager(backoff: Backoff) -> (TaskManager<FakeClock>, Arc<InMemoryNodeStore>) {
    let store = Arc::new(InMemoryNodeStore::new());
    let manager = TaskManager::new(
        store.clone(),
        registry(),
        ConductorId::new("conductor-a"),
        FakeClock::new(),
        backoff,
    );
    (manager, store)
}

#[tokio::test]
async fn exclusive_acquire_then_release_allows_next_exclusive_acquire() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();

    let task = manager.acquire(node.id, false, "test").await.unwrap();
    assert!(!task.is_shared());
    task.release().await.unwrap();

    let second = manager.acquire(node.id, false, "test").await.unwrap();
    assert_eq!(second.node.id, node.id);
}

#[tokio::test(start_paused = true)]
async fn exclusive_acquire_retries_past_a_lock_then_succeeds() {
    let (manager, store) = manager(Backoff::new(1, 1, 50));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();
    store.atomic_reserve(node.id, "other-host").await.unwrap();

    let store_for_release = store.clone();
    let id = node.id;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        store_for_release.atomic_release(id, "other-host").await.unwrap();
    });

    let task = manager.acquire(node.id, false, "test").await.unwrap();
    assert_eq!(task.node.id, node.id);
}

#[tokio::test]
async fn exclusive_acquire_fails_once_retries_are_exhausted() {
    let (manager, store) = manager(Backoff::new(1, 1, 0));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();
    store.atomic_reserve(node.id, "other-host").await.unwrap();

    let err = manager.acquire(node.id, false, "test").await.unwrap_err();
    assert!(matches!(
        err,
        conductor_core::ConductorError::Concurrency(conductor_core::ConcurrencyError::NodeLocked(_))
    ));
}

#[tokio::test]
async fn shared_acquire_allows_concurrent_readers() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();

    let first = manager.acquire(node.id, true, "list").await.unwrap();
    let second = manager.acquire(node.id, true, "list").await.unwrap();
    assert!(first.is_shared());
    assert!(second.is_shared());
    first.release().await.unwrap();
    second.release().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn exclusive_acquire_waits_for_shared_readers_to_release() {
    let (manager, store) = manager(Backoff::new(1, 1, 50));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();

    let reader = manager.acquire(node.id, true, "list").await.unwrap();
    let id = node.id;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        reader.release().await.unwrap();
    });

    let writer = manager.acquire(id, false, "write").await.unwrap();
    assert!(!writer.is_shared());
}

#[tokio::test]
async fn upgrade_promotes_a_shared_task_to_exclusive() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();

    let mut task = manager.acquire(node.id, true, "list").await.unwrap();
    assert!(task.is_shared());
    task.upgrade().await.unwrap();
    assert!(!task.is_shared());

    // A second exclusive attempt from elsewhere must now see the row locked.
    let err = store.atomic_reserve(node.id, "other-host").await.unwrap_err();
    assert!(matches!(
        err,
        conductor_core::ConductorError::Concurrency(conductor_core::ConcurrencyError::NodeLocked(_))
    ));
}

#[tokio::test]
async fn upgrade_failure_leaves_the_task_usable_as_shared() {
    let (manager, store) = manager(Backoff::new(1, 1, 0));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();
    store.atomic_reserve(node.id, "other-host").await.unwrap();

    let mut task = manager.acquire(node.id, true, "list").await.unwrap();
    let err = task.upgrade().await.unwrap_err();
    assert!(matches!(
        err,
        conductor_core::ConductorError::Concurrency(conductor_core::ConcurrencyError::NodeLocked(_))
    ));
    assert!(task.is_shared());
    task.release().await.unwrap();
}

#[tokio::test]
async fn apply_event_persists_a_valid_transition() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().provision_state(ProvisionState::Available).build();
    store.create_node(node.clone()).await.unwrap();

    let mut task = manager.acquire(node.id, false, "deploy").await.unwrap();
    task.apply_event(ProvisionEvent::Deploy).await.unwrap();
    assert_eq!(task.current_state(), ProvisionState::Deploying);
    assert_eq!(task.target_state(), Some(ProvisionState::Active));
    assert_eq!(task.node.provision_state, ProvisionState::Deploying);
    task.release().await.unwrap();
}

#[tokio::test]
async fn apply_event_rejects_an_event_with_no_transition() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().provision_state(ProvisionState::Available).build();
    store.create_node(node.clone()).await.unwrap();

    let mut task = manager.acquire(node.id, false, "deploy").await.unwrap();
    let err = task.apply_event(ProvisionEvent::Done).await.unwrap_err();
    assert!(matches!(err, conductor_core::ConductorError::Internal(_)));
    assert_eq!(task.node.provision_state, ProvisionState::Available);
}

#[tokio::test]
async fn apply_event_on_a_shared_task_is_rejected() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();

    let mut task = manager.acquire(node.id, true, "list").await.unwrap();
    let err = task.apply_event(ProvisionEvent::Deploy).await.unwrap_err();
    assert!(matches!(err, conductor_core::ConductorError::Internal(_)));
}

#[tokio::test]
async fn force_provision_state_round_trips() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().provision_state(ProvisionState::DeployWait).build();
    store.create_node(node.clone()).await.unwrap();

    let mut task = manager.acquire(node.id, false, "sweep").await.unwrap();
    task.force_provision_state(ProvisionState::DeployFail, None, Some("timed out".to_string()))
        .await
        .unwrap();
    assert_eq!(task.current_state(), ProvisionState::DeployFail);
    assert_eq!(task.node.last_error.as_deref(), Some("timed out"));
}

#[tokio::test]
async fn mutate_persists_arbitrary_fields() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();

    let mut task = manager.acquire(node.id, false, "executor").await.unwrap();
    task.mutate(|n| {
        n.driver_internal_info.insert("deploy_step_index".to_string(), serde_json::json!(2));
    })
    .await
    .unwrap();
    assert_eq!(task.node.driver_internal_info.get("deploy_step_index"), Some(&serde_json::json!(2)));
}

#[tokio::test]
async fn spawn_after_hands_ownership_to_the_continuation() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();
    let pool = BoundedWorkerPool::new(2);

    let task = manager.acquire(node.id, false, "deploy").await.unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = ran.clone();
    task.spawn_after(&pool, move |task| async move {
        ran_clone.fetch_add(1, Ordering::SeqCst);
        task.release().await.unwrap();
    })
    .unwrap();

    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(pool.available_permits(), 2);
}

#[tokio::test]
async fn spawn_after_returns_the_task_intact_when_the_pool_is_saturated() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();
    let pool = BoundedWorkerPool::new(1);
    let _permit = pool.try_acquire().unwrap();

    let task = manager.acquire(node.id, false, "deploy").await.unwrap();
    let id = node.id;
    let (err, task) = task.spawn_after(&pool, |_task| async {}).unwrap_err();
    assert!(matches!(err, conductor_core::ConcurrencyError::NoFreeConductorWorker));
    assert_eq!(task.node.id, id);
    task.release().await.unwrap();
}

#[tokio::test]
async fn process_event_applies_then_spawns() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().provision_state(ProvisionState::Available).build();
    store.create_node(node.clone()).await.unwrap();
    let pool = BoundedWorkerPool::new(2);

    let task = manager.acquire(node.id, false, "deploy").await.unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = ran.clone();
    task.process_event(&pool, ProvisionEvent::Deploy, move |task| async move {
        ran_clone.fetch_add(1, Ordering::SeqCst);
        task.release().await.unwrap();
    })
    .await
    .unwrap();

    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);

    let stored = store.get_node_by_identity(&node.id.into()).await.unwrap();
    assert_eq!(stored.provision_state, ProvisionState::Deploying);
}

#[tokio::test]
async fn process_event_rolls_back_when_scheduling_fails() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().provision_state(ProvisionState::Available).build();
    store.create_node(node.clone()).await.unwrap();
    let pool = BoundedWorkerPool::new(1);
    let _permit = pool.try_acquire().unwrap();

    let task = manager.acquire(node.id, false, "deploy").await.unwrap();
    let err = task
        .process_event(&pool, ProvisionEvent::Deploy, |_task| async {})
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        conductor_core::ConductorError::Concurrency(conductor_core::ConcurrencyError::NoFreeConductorWorker)
    ));

    let stored = store.get_node_by_identity(&node.id.into()).await.unwrap();
    assert_eq!(stored.provision_state, ProvisionState::Available);
    assert!(stored.last_error.is_some());
    assert!(stored.reservation.is_none());
}

#[tokio::test]
async fn dropping_an_exclusive_task_without_release_eventually_frees_the_reservation() {
    let (manager, store) = manager(Backoff::new(1, 1, 1));
    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();

    {
        let _task = manager.acquire(node.id, false, "deploy").await.unwrap();
    }
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    let stored = store.get_node_by_identity(&node.id.into()).await.unwrap();
    assert!(stored.reservation.is_none());
}
