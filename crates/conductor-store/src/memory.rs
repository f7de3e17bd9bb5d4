// SPDX-License-Identifier: MIT

//! In-memory reference implementation of [`crate::store::NodeStore`]. The
//! only implementation this crate ships — a real database-backed store
//! remains an external collaborator (spec §1/§6).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use conductor_core::error::{ClientError, ConcurrencyError, ConductorError, StorageError};
use conductor_core::{Conductor, ConductorId, MacAddress, Node, NodeId, Port, PortId, Portgroup, PortgroupId};

use crate::filter::{NodeFilter, NodeSort};
use crate::store::{NodeDiff, NodeIdentity, NodeStore};

#[derive(Default)]
struct Inner {
    nodes: HashMap<NodeId, Node>,
    ports: HashMap<PortId, Port>,
    portgroups: HashMap<PortgroupId, Portgroup>,
    conductors: HashMap<ConductorId, Conductor>,
}

impl Inner {
    fn mac_in_use(&self, mac: &MacAddress, excluding: Option<PortId>) -> bool {
        self.ports.values().any(|p| p.address == *mac && Some(p.id) != excluding)
    }

    fn instance_uuid_in_use(&self, instance_uuid: &str, excluding: Option<NodeId>) -> bool {
        self.nodes
            .values()
            .any(|n| n.instance_uuid.as_deref() == Some(instance_uuid) && Some(n.id) != excluding)
    }
}

/// A plain `Mutex`-guarded in-memory node store. Fine for tests and the
/// demonstration binary; a production deployment replaces this with a real
/// database-backed implementation behind the same trait.
#[derive(Default)]
pub struct InMemoryNodeStore {
    inner: Mutex<Inner>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn create_node(&self, node: Node) -> Result<Node, ConductorError> {
        let mut inner = self.inner.lock();
        if let Some(uuid) = &node.instance_uuid {
            if inner.instance_uuid_in_use(uuid, None) {
                return Err(ClientError::InvalidParameterValue(format!(
                    "instance_uuid {uuid} already in use"
                ))
                .into());
            }
        }
        inner.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    async fn get_node_by_identity(&self, identity: &NodeIdentity) -> Result<Node, ConductorError> {
        let inner = self.inner.lock();
        let found = match identity {
            NodeIdentity::Id(id) => inner.nodes.get(id).cloned(),
            NodeIdentity::Name(name) => inner.nodes.values().find(|n| n.name.as_deref() == Some(name)).cloned(),
        };
        found.ok_or_else(|| ClientError::NodeNotFound(identity_label(identity)).into())
    }

    async fn list_node_info(
        &self,
        filter: &NodeFilter,
        sort: NodeSort,
    ) -> Result<Vec<Node>, ConductorError> {
        let inner = self.inner.lock();
        let mut nodes: Vec<Node> = inner
            .nodes
            .values()
            .filter(|n| match &filter.reservation {
                Some(expected) => &n.reservation == expected,
                None => true,
            })
            .filter(|n| filter.maintenance.map(|m| n.maintenance == m).unwrap_or(true))
            .filter(|n| {
                filter
                    .provision_state
                    .as_ref()
                    .map(|states| states.contains(&n.provision_state))
                    .unwrap_or(true)
            })
            .filter(|n| {
                filter
                    .provisioned_before_ms
                    .map(|threshold| n.provision_updated_at < threshold)
                    .unwrap_or(true)
            })
            .filter(|n| filter.driver.as_deref().map(|d| n.driver == d).unwrap_or(true))
            .cloned()
            .collect();

        match sort {
            NodeSort::None => {}
            NodeSort::ProvisionUpdatedAtAsc => nodes.sort_by_key(|n| n.provision_updated_at),
            NodeSort::ProvisionUpdatedAtDesc => {
                nodes.sort_by_key(|n| std::cmp::Reverse(n.provision_updated_at))
            }
        }
        Ok(nodes)
    }

    async fn update_node(&self, diff: NodeDiff) -> Result<Node, ConductorError> {
        let mut inner = self.inner.lock();
        let current = inner
            .nodes
            .get(&diff.node.id)
            .ok_or_else(|| ClientError::NodeNotFound(diff.node.id.to_string()))?;
        if current.version != diff.expected_version {
            return Err(StorageError::VersionConflict(diff.node.id.to_string()).into());
        }
        if let Some(uuid) = &diff.node.instance_uuid {
            if inner.instance_uuid_in_use(uuid, Some(diff.node.id)) {
                return Err(ClientError::InvalidParameterValue(format!(
                    "instance_uuid {uuid} already in use"
                ))
                .into());
            }
        }
        let mut next = diff.node;
        next.version = diff.expected_version + 1;
        inner.nodes.insert(next.id, next.clone());
        Ok(next)
    }

    async fn delete_node(&self, id: NodeId) -> Result<(), ConductorError> {
        let mut inner = self.inner.lock();
        inner.nodes.remove(&id).ok_or_else(|| ClientError::NodeNotFound(id.to_string()))?;
        let port_ids: Vec<PortId> =
            inner.ports.values().filter(|p| p.node_id == id).map(|p| p.id).collect();
        for pid in port_ids {
            inner.ports.remove(&pid);
        }
        let pg_ids: Vec<PortgroupId> =
            inner.portgroups.values().filter(|p| p.node_id == id).map(|p| p.id).collect();
        for pgid in pg_ids {
            inner.portgroups.remove(&pgid);
        }
        Ok(())
    }

    async fn atomic_reserve(&self, id: NodeId, host: &str) -> Result<Node, ConductorError> {
        let mut inner = self.inner.lock();
        let node = inner.nodes.get_mut(&id).ok_or_else(|| ClientError::NodeNotFound(id.to_string()))?;
        if let Some(existing) = &node.reservation {
            if existing != host {
                return Err(ConcurrencyError::NodeLocked(id.to_string()).into());
            }
        }
        node.reservation = Some(host.to_string());
        node.version += 1;
        Ok(node.clone())
    }

    async fn atomic_release(&self, id: NodeId, host: &str) -> Result<(), ConductorError> {
        let mut inner = self.inner.lock();
        if let Some(node) = inner.nodes.get_mut(&id) {
            if node.reservation.as_deref() == Some(host) {
                node.reservation = None;
                node.version += 1;
            }
        }
        Ok(())
    }

    async fn create_port(&self, port: Port) -> Result<Port, ConductorError> {
        let mut inner = self.inner.lock();
        if inner.mac_in_use(&port.address, None) {
            return Err(ClientError::MacAlreadyExists(port.address.to_string()).into());
        }
        inner.ports.insert(port.id, port.clone());
        Ok(port)
    }

    async fn get_port(&self, id: PortId) -> Result<Port, ConductorError> {
        let inner = self.inner.lock();
        inner.ports.get(&id).cloned().ok_or_else(|| ClientError::PortNotFound(id.to_string()).into())
    }

    async fn list_ports_for_node(&self, node_id: NodeId) -> Result<Vec<Port>, ConductorError> {
        let inner = self.inner.lock();
        Ok(inner.ports.values().filter(|p| p.node_id == node_id).cloned().collect())
    }

    async fn update_port(&self, expected_version: u64, port: Port) -> Result<Port, ConductorError> {
        let mut inner = self.inner.lock();
        let current = inner.ports.get(&port.id).ok_or_else(|| ClientError::PortNotFound(port.id.to_string()))?;
        if current.version != expected_version {
            return Err(StorageError::VersionConflict(port.id.to_string()).into());
        }
        if current.address != port.address && inner.mac_in_use(&port.address, Some(port.id)) {
            return Err(ClientError::MacAlreadyExists(port.address.to_string()).into());
        }
        let mut next = port;
        next.version = expected_version + 1;
        inner.ports.insert(next.id, next.clone());
        Ok(next)
    }

    async fn delete_port(&self, id: PortId) -> Result<(), ConductorError> {
        let mut inner = self.inner.lock();
        inner.ports.remove(&id).ok_or_else(|| ClientError::PortNotFound(id.to_string()))?;
        Ok(())
    }

    async fn create_portgroup(&self, portgroup: Portgroup) -> Result<Portgroup, ConductorError> {
        let mut inner = self.inner.lock();
        inner.portgroups.insert(portgroup.id, portgroup.clone());
        Ok(portgroup)
    }

    async fn get_portgroup(&self, id: PortgroupId) -> Result<Portgroup, ConductorError> {
        let inner = self.inner.lock();
        inner
            .portgroups
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::PortNotFound(id.to_string()).into())
    }

    async fn list_portgroups_for_node(&self, node_id: NodeId) -> Result<Vec<Portgroup>, ConductorError> {
        let inner = self.inner.lock();
        Ok(inner.portgroups.values().filter(|p| p.node_id == node_id).cloned().collect())
    }

    async fn update_portgroup(
        &self,
        expected_version: u64,
        portgroup: Portgroup,
    ) -> Result<Portgroup, ConductorError> {
        let mut inner = self.inner.lock();
        let current = inner
            .portgroups
            .get(&portgroup.id)
            .ok_or_else(|| ClientError::PortNotFound(portgroup.id.to_string()))?;
        if current.version != expected_version {
            return Err(StorageError::VersionConflict(portgroup.id.to_string()).into());
        }
        let mut next = portgroup;
        next.version = expected_version + 1;
        inner.portgroups.insert(next.id, next.clone());
        Ok(next)
    }

    async fn delete_portgroup(&self, id: PortgroupId) -> Result<(), ConductorError> {
        let mut inner = self.inner.lock();
        if inner.ports.values().any(|p| p.portgroup_id == Some(id)) {
            return Err(ClientError::PortgroupNotEmpty(id.to_string()).into());
        }
        inner.portgroups.remove(&id).ok_or_else(|| ClientError::PortNotFound(id.to_string()))?;
        Ok(())
    }

    async fn upsert_conductor(&self, conductor: Conductor) -> Result<Conductor, ConductorError> {
        let mut inner = self.inner.lock();
        inner.conductors.insert(conductor.id.clone(), conductor.clone());
        Ok(conductor)
    }

    async fn get_conductor(&self, id: &ConductorId) -> Result<Conductor, ConductorError> {
        let inner = self.inner.lock();
        inner
            .conductors
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::InvalidParameterValue(format!("unknown conductor {id}")).into())
    }

    async fn list_conductors(&self) -> Result<Vec<Conductor>, ConductorError> {
        let inner = self.inner.lock();
        Ok(inner.conductors.values().cloned().collect())
    }

    async fn remove_conductor(&self, id: &ConductorId) -> Result<(), ConductorError> {
        let mut inner = self.inner.lock();
        inner.conductors.remove(id);
        Ok(())
    }

    async fn list_offline_conductors(
        &self,
        now_ms: u64,
        offline_threshold_ms: u64,
    ) -> Result<Vec<Conductor>, ConductorError> {
        let inner = self.inner.lock();
        Ok(inner
            .conductors
            .values()
            .filter(|c| c.is_offline(now_ms, offline_threshold_ms))
            .cloned()
            .collect())
    }
}

fn identity_label(identity: &NodeIdentity) -> String {
    match identity {
        NodeIdentity::Id(id) => id.to_string(),
        NodeIdentity::Name(name) => name.clone(),
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
