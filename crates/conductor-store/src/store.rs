// SPDX-License-Identifier: MIT

//! The `NodeStore` trait: the durable-persistence boundary the rest of the
//! conductor core is built against (spec §6). The crate ships exactly one
//! implementation, [`crate::memory::InMemoryNodeStore`] — a real database
//! backend remains an external collaborator per spec §1.

use async_trait::async_trait;
use conductor_core::error::ConductorError;
use conductor_core::{Conductor, ConductorId, Node, NodeId, Port, PortId, Portgroup, PortgroupId};

use crate::filter::{NodeFilter, NodeSort};

/// The caller-supplied way of naming a node: by its immutable UUID or by its
/// (also-unique, but reassignable) human name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeIdentity {
    Id(NodeId),
    Name(String),
}

impl From<NodeId> for NodeIdentity {
    fn from(id: NodeId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for NodeIdentity {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// A compare-and-swap mutation applied to one node: the caller reads a
/// `Node`, mutates a clone, and calls `update_node` with the clone and the
/// version it was read at. The store rejects the write with
/// `StorageError::VersionConflict` if the row has moved on.
pub struct NodeDiff {
    pub expected_version: u64,
    pub node: Node,
}

/// Persistence and atomic reservation of nodes, ports, portgroups, and the
/// conductor registry (spec §6).
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn create_node(&self, node: Node) -> Result<Node, ConductorError>;

    async fn get_node_by_identity(&self, identity: &NodeIdentity) -> Result<Node, ConductorError>;

    async fn list_node_info(
        &self,
        filter: &NodeFilter,
        sort: NodeSort,
    ) -> Result<Vec<Node>, ConductorError>;

    /// Compare-and-swap update. Fails with `StorageError::VersionConflict` if
    /// `diff.expected_version` no longer matches the stored row.
    async fn update_node(&self, diff: NodeDiff) -> Result<Node, ConductorError>;

    /// Deletes the node and cascades to its ports and portgroups.
    async fn delete_node(&self, id: NodeId) -> Result<(), ConductorError>;

    /// Conditional update setting `reservation = host` only if currently
    /// unset. Returns the node on success; `ConcurrencyError::NodeLocked` if
    /// already reserved by someone else.
    async fn atomic_reserve(&self, id: NodeId, host: &str) -> Result<Node, ConductorError>;

    /// Clears `reservation` only if it still equals `host`. A no-op (not an
    /// error) if the reservation has already moved on or was already clear.
    async fn atomic_release(&self, id: NodeId, host: &str) -> Result<(), ConductorError>;

    async fn create_port(&self, port: Port) -> Result<Port, ConductorError>;
    async fn get_port(&self, id: PortId) -> Result<Port, ConductorError>;
    async fn list_ports_for_node(&self, node_id: NodeId) -> Result<Vec<Port>, ConductorError>;
    async fn update_port(&self, expected_version: u64, port: Port) -> Result<Port, ConductorError>;
    async fn delete_port(&self, id: PortId) -> Result<(), ConductorError>;

    async fn create_portgroup(&self, portgroup: Portgroup) -> Result<Portgroup, ConductorError>;
    async fn get_portgroup(&self, id: PortgroupId) -> Result<Portgroup, ConductorError>;
    async fn list_portgroups_for_node(&self, node_id: NodeId) -> Result<Vec<Portgroup>, ConductorError>;
    async fn update_portgroup(
        &self,
        expected_version: u64,
        portgroup: Portgroup,
    ) -> Result<Portgroup, ConductorError>;
    /// Fails with `ClientError::PortgroupNotEmpty` unless every port that
    /// belonged to it has already been reparented or deleted.
    async fn delete_portgroup(&self, id: PortgroupId) -> Result<(), ConductorError>;

    /// Registers a conductor, or re-stamps its heartbeat if already present.
    async fn upsert_conductor(&self, conductor: Conductor) -> Result<Conductor, ConductorError>;
    async fn get_conductor(&self, id: &ConductorId) -> Result<Conductor, ConductorError>;
    async fn list_conductors(&self) -> Result<Vec<Conductor>, ConductorError>;
    async fn remove_conductor(&self, id: &ConductorId) -> Result<(), ConductorError>;
    async fn list_offline_conductors(
        &self,
        now_ms: u64,
        offline_threshold_ms: u64,
    ) -> Result<Vec<Conductor>, ConductorError>;
}
