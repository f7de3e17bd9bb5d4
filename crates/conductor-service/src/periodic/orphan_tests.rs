// SPDX-License-Identifier: MIT

use conductor_core::test_support::{ConductorBuilder, NodeBuilder};
use conductor_fsm::ProvisionState;
use conductor_store::{NodeIdentity, NodeStore};

use crate::periodic::test_support::build_ctx;

#[tokio::test]
async fn a_reserved_node_is_released_and_failed_when_its_conductor_goes_offline() {
    let (ctx, store) = build_ctx("conductor-a", &[]);
    let threshold = ctx.settings.periodic.conductor_offline_threshold_ms;
    ctx.clock.set_epoch_ms(threshold + 1000);

    let dead = ConductorBuilder::default().id("conductor-dead").updated_at_ms(0).build();
    store.upsert_conductor(dead.clone()).await.unwrap();

    let node = NodeBuilder::default()
        .provision_state(ProvisionState::Deploying)
        .reservation("conductor-dead")
        .build();
    store.create_node(node.clone()).await.unwrap();

    super::run_once(&ctx).await.unwrap();

    let stored = store.get_node_by_identity(&NodeIdentity::from(node.id)).await.unwrap();
    assert_eq!(stored.provision_state, ProvisionState::DeployFail);
    assert!(stored.reservation.is_none());
    assert!(stored.last_error.is_some());
}

#[tokio::test]
async fn a_node_whose_conductor_is_still_alive_is_left_alone() {
    let (ctx, store) = build_ctx("conductor-a", &[]);

    let alive = ConductorBuilder::default().id("conductor-b").updated_at_ms(ctx.clock.epoch_ms()).build();
    store.upsert_conductor(alive).await.unwrap();

    let node = NodeBuilder::default()
        .provision_state(ProvisionState::Deploying)
        .reservation("conductor-b")
        .build();
    store.create_node(node.clone()).await.unwrap();

    super::run_once(&ctx).await.unwrap();

    let stored = store.get_node_by_identity(&NodeIdentity::from(node.id)).await.unwrap();
    assert_eq!(stored.provision_state, ProvisionState::Deploying);
    assert_eq!(stored.reservation.as_deref(), Some("conductor-b"));
}

#[tokio::test]
async fn a_stable_state_orphan_is_released_without_a_fail_transition() {
    let (ctx, store) = build_ctx("conductor-a", &[]);
    let threshold = ctx.settings.periodic.conductor_offline_threshold_ms;
    ctx.clock.set_epoch_ms(threshold + 1000);

    let dead = ConductorBuilder::default().id("conductor-dead").updated_at_ms(0).build();
    store.upsert_conductor(dead).await.unwrap();

    let node = NodeBuilder::default()
        .provision_state(ProvisionState::Available)
        .reservation("conductor-dead")
        .build();
    store.create_node(node.clone()).await.unwrap();

    super::run_once(&ctx).await.unwrap();

    let stored = store.get_node_by_identity(&NodeIdentity::from(node.id)).await.unwrap();
    assert_eq!(stored.provision_state, ProvisionState::Available);
    assert!(stored.reservation.is_none());
}
