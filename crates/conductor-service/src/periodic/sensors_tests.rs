// SPDX-License-Identifier: MIT

use std::sync::Arc;

use conductor_core::test_support::NodeBuilder;
use conductor_store::{NodeIdentity, NodeStore};

use crate::periodic::test_support::build_ctx;

#[tokio::test]
async fn disabled_sensor_shipping_is_a_no_op() {
    let (ctx, store) = build_ctx("conductor-a", &[]);
    assert!(!ctx.settings.sensors.enabled);

    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();

    super::run_once(&ctx).await.unwrap();

    let stored = store.get_node_by_identity(&NodeIdentity::from(node.id)).await.unwrap();
    assert_eq!(stored.version, node.version);
}

#[tokio::test]
async fn enabled_sensor_shipping_collects_without_mutating_the_node() {
    let (mut ctx, store) = build_ctx("conductor-a", &[]);
    {
        let ctx_mut = Arc::get_mut(&mut ctx).unwrap();
        ctx_mut.settings.sensors.enabled = true;
    }

    let node = NodeBuilder::default().build();
    store.create_node(node.clone()).await.unwrap();

    super::run_once(&ctx).await.unwrap();

    let stored = store.get_node_by_identity(&NodeIdentity::from(node.id)).await.unwrap();
    assert_eq!(stored.version, node.version);
}

#[tokio::test]
async fn a_maintenance_node_is_skipped() {
    let (mut ctx, store) = build_ctx("conductor-a", &[]);
    {
        let ctx_mut = Arc::get_mut(&mut ctx).unwrap();
        ctx_mut.settings.sensors.enabled = true;
    }

    let node = NodeBuilder::default().maintenance(true).build();
    store.create_node(node.clone()).await.unwrap();

    super::run_once(&ctx).await.unwrap();

    let stored = store.get_node_by_identity(&NodeIdentity::from(node.id)).await.unwrap();
    assert_eq!(stored.version, node.version);
    assert!(stored.maintenance);
}
