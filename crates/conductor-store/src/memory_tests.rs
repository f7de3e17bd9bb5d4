// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use conductor_core::error::{ClientError, ConcurrencyError, ConductorError, StorageError};
use conductor_core::{MacAddress, Node, Port, PortId, Portgroup, PortgroupId};
use conductor_fsm::ProvisionState;

use super::*;

fn port(node_id: NodeId, mac: &str) -> Port {
    Port {
        id: PortId::new(),
        node_id,
        address: MacAddress::new(mac).unwrap(),
        portgroup_id: None,
        pxe_enabled: true,
        local_link_connection: HashMap::new(),
        extra: HashMap::new(),
        version: 0,
    }
}

fn portgroup(node_id: NodeId, mac: &str) -> Portgroup {
    Portgroup {
        id: PortgroupId::new(),
        node_id,
        name: None,
        address: MacAddress::new(mac).unwrap(),
        extra: HashMap::new(),
        version: 0,
    }
}

#[tokio::test]
async fn create_and_get_node_round_trips() {
    let store = InMemoryNodeStore::new();
    let node = Node::builder().build();
    let created = store.create_node(node.clone()).await.unwrap();
    let fetched = store.get_node_by_identity(&NodeIdentity::Id(created.id)).await.unwrap();
    assert_eq!(fetched.id, node.id);
}

#[tokio::test]
async fn get_by_name_finds_node() {
    let store = InMemoryNodeStore::new();
    let node = Node::builder().name("rack-1").build();
    store.create_node(node).await.unwrap();
    let fetched = store.get_node_by_identity(&NodeIdentity::Name("rack-1".into())).await.unwrap();
    assert_eq!(fetched.name.as_deref(), Some("rack-1"));
}

#[tokio::test]
async fn missing_node_is_not_found() {
    let store = InMemoryNodeStore::new();
    let err = store.get_node_by_identity(&NodeIdentity::Name("ghost".into())).await.unwrap_err();
    assert!(matches!(err, ConductorError::Client(ClientError::NodeNotFound(_))));
}

#[tokio::test]
async fn update_node_rejects_stale_version() {
    let store = InMemoryNodeStore::new();
    let node = store.create_node(Node::builder().build()).await.unwrap();
    let mut stale = node.clone();
    stale.maintenance = true;
    // Apply once, bumping the version.
    store.update_node(NodeDiff { expected_version: node.version, node: stale.clone() }).await.unwrap();
    // Retry with the now-stale version.
    let err = store
        .update_node(NodeDiff { expected_version: node.version, node: stale })
        .await
        .unwrap_err();
    assert!(matches!(err, ConductorError::Storage(StorageError::VersionConflict(_))));
}

#[tokio::test]
async fn instance_uuid_must_be_unique() {
    let store = InMemoryNodeStore::new();
    let a = store.create_node(Node::builder().instance_uuid("inst-1").build()).await.unwrap();
    let b = store.create_node(Node::builder().build()).await.unwrap();
    let mut b_dup = b.clone();
    b_dup.instance_uuid = Some("inst-1".into());
    let err = store.update_node(NodeDiff { expected_version: b.version, node: b_dup }).await.unwrap_err();
    assert!(matches!(err, ConductorError::Client(ClientError::InvalidParameterValue(_))));
    assert_eq!(a.instance_uuid.as_deref(), Some("inst-1"));
}

#[tokio::test]
async fn atomic_reserve_excludes_other_hosts() {
    let store = InMemoryNodeStore::new();
    let node = store.create_node(Node::builder().build()).await.unwrap();
    let reserved = store.atomic_reserve(node.id, "conductor-a").await.unwrap();
    assert_eq!(reserved.reservation.as_deref(), Some("conductor-a"));

    let err = store.atomic_reserve(node.id, "conductor-b").await.unwrap_err();
    assert!(matches!(err, ConductorError::Concurrency(ConcurrencyError::NodeLocked(_))));

    // Re-acquiring by the same host that already holds it is idempotent.
    let reserved_again = store.atomic_reserve(node.id, "conductor-a").await.unwrap();
    assert_eq!(reserved_again.reservation.as_deref(), Some("conductor-a"));
}

#[tokio::test]
async fn atomic_release_only_clears_matching_host() {
    let store = InMemoryNodeStore::new();
    let node = store.create_node(Node::builder().build()).await.unwrap();
    store.atomic_reserve(node.id, "conductor-a").await.unwrap();

    store.atomic_release(node.id, "conductor-b").await.unwrap();
    let still_reserved = store.get_node_by_identity(&NodeIdentity::Id(node.id)).await.unwrap();
    assert_eq!(still_reserved.reservation.as_deref(), Some("conductor-a"));

    store.atomic_release(node.id, "conductor-a").await.unwrap();
    let released = store.get_node_by_identity(&NodeIdentity::Id(node.id)).await.unwrap();
    assert!(released.reservation.is_none());
}

#[tokio::test]
async fn port_mac_must_be_unique_across_store() {
    let store = InMemoryNodeStore::new();
    let node = store.create_node(Node::builder().build()).await.unwrap();
    store.create_port(port(node.id, "aa:bb:cc:dd:ee:ff")).await.unwrap();
    let err = store.create_port(port(node.id, "aa:bb:cc:dd:ee:ff")).await.unwrap_err();
    assert!(matches!(err, ConductorError::Client(ClientError::MacAlreadyExists(_))));
}

#[tokio::test]
async fn delete_portgroup_requires_empty() {
    let store = InMemoryNodeStore::new();
    let node = store.create_node(Node::builder().build()).await.unwrap();
    let pg = store.create_portgroup(portgroup(node.id, "aa:bb:cc:dd:ee:01")).await.unwrap();
    let mut p = port(node.id, "aa:bb:cc:dd:ee:02");
    p.portgroup_id = Some(pg.id);
    let p = store.create_port(p).await.unwrap();

    let err = store.delete_portgroup(pg.id).await.unwrap_err();
    assert!(matches!(err, ConductorError::Client(ClientError::PortgroupNotEmpty(_))));

    store.delete_port(p.id).await.unwrap();
    store.delete_portgroup(pg.id).await.unwrap();
}

#[tokio::test]
async fn delete_node_cascades_ports_and_portgroups() {
    let store = InMemoryNodeStore::new();
    let node = store.create_node(Node::builder().build()).await.unwrap();
    let p = store.create_port(port(node.id, "aa:bb:cc:dd:ee:03")).await.unwrap();

    store.delete_node(node.id).await.unwrap();
    let err = store.get_port(p.id).await.unwrap_err();
    assert!(matches!(err, ConductorError::Client(ClientError::PortNotFound(_))));
}

#[tokio::test]
async fn list_node_info_filters_and_sorts() {
    let store = InMemoryNodeStore::new();
    let mut a = store
        .create_node(Node::builder().provision_state(ProvisionState::DeployWait).build())
        .await
        .unwrap();
    a.provision_updated_at = 200;
    store.update_node(NodeDiff { expected_version: a.version, node: a.clone() }).await.unwrap();

    let mut b = store
        .create_node(Node::builder().provision_state(ProvisionState::DeployWait).build())
        .await
        .unwrap();
    b.provision_updated_at = 100;
    store.update_node(NodeDiff { expected_version: b.version, node: b.clone() }).await.unwrap();

    store.create_node(Node::builder().provision_state(ProvisionState::Available).build()).await.unwrap();

    let filter = NodeFilter::new().provision_state(vec![ProvisionState::DeployWait]);
    let found = store.list_node_info(&filter, NodeSort::ProvisionUpdatedAtAsc).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].provision_updated_at, 100);
    assert_eq!(found[1].provision_updated_at, 200);
}

#[tokio::test]
async fn conductor_registry_tracks_heartbeats_and_offline_status() {
    let store = InMemoryNodeStore::new();
    let conductor = conductor_core::Conductor::builder().updated_at_ms(1_000).build();
    store.upsert_conductor(conductor.clone()).await.unwrap();

    assert!(store.list_offline_conductors(1_500, 1_000).await.unwrap().is_empty());
    assert_eq!(store.list_offline_conductors(5_000, 1_000).await.unwrap().len(), 1);

    store.remove_conductor(&conductor.id).await.unwrap();
    assert!(store.list_conductors().await.unwrap().is_empty());
}
