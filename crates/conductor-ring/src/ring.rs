// SPDX-License-Identifier: MIT

//! A classic consistent hash ring mapping `(node uuid, driver)` to the
//! conductor hostname that owns it (spec §4.7).
//!
//! The ring is read-only after each [`HashRing::rebuild`]; readers always see
//! either the previous or the next membership, never a partially-rebuilt one
//! — the new ring is built off to the side and published with a single
//! pointer swap.

use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use conductor_core::{ConductorId, NodeId};

#[derive(Debug, Default)]
struct RingData {
    /// `(hash, owner)` pairs sorted ascending by hash.
    points: Vec<(u64, ConductorId)>,
}

/// A consistent hash ring over a set of live conductor hostnames.
pub struct HashRing {
    replicas: u32,
    data: RwLock<Arc<RingData>>,
}

impl HashRing {
    pub fn new(replicas: u32) -> Self {
        Self { replicas: replicas.max(1), data: RwLock::new(Arc::new(RingData::default())) }
    }

    /// Rebuild the ring from the current conductor membership. `O(members *
    /// replicas log(members * replicas))` — cheap even for large clusters,
    /// per spec §4.7.
    pub fn rebuild(&self, members: &[ConductorId]) {
        let mut points = Vec::with_capacity(members.len() * self.replicas as usize);
        for member in members {
            for replica in 0..self.replicas {
                let point = hash_point(member.as_str(), replica);
                points.push((point, member.clone()));
            }
        }
        points.sort_by_key(|(h, _)| *h);
        let next = Arc::new(RingData { points });
        *self.data.write() = next;
    }

    /// Whether the ring currently has no members.
    pub fn is_empty(&self) -> bool {
        self.data.read().points.is_empty()
    }

    /// The conductor that owns `(node_id, driver)` under the current
    /// membership, or `None` if the ring has no members.
    pub fn owner_for(&self, node_id: &NodeId, driver: &str) -> Option<ConductorId> {
        let data = self.data.read().clone();
        if data.points.is_empty() {
            return None;
        }
        let key = lookup_hash(node_id, driver);
        let idx = data.points.partition_point(|(h, _)| *h < key);
        let (_, owner) = &data.points[idx % data.points.len()];
        Some(owner.clone())
    }

    /// Whether `(node_id, driver)` is mapped to `self_id` under the current
    /// membership — the check every externally invoked operation runs before
    /// acting locally versus forwarding via RPC (spec §4.3).
    pub fn node_is_local(&self, node_id: &NodeId, driver: &str, self_id: &ConductorId) -> bool {
        self.owner_for(node_id, driver).as_ref() == Some(self_id)
    }
}

fn first_eight_bytes(digest: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[0..8]);
    u64::from_be_bytes(buf)
}

fn hash_point(hostname: &str, replica: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(hostname.as_bytes());
    hasher.update(b"|");
    hasher.update(replica.to_le_bytes());
    first_eight_bytes(&hasher.finalize())
}

fn lookup_hash(node_id: &NodeId, driver: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(node_id.as_uuid().as_bytes());
    hasher.update(b"|");
    hasher.update(driver.as_bytes());
    first_eight_bytes(&hasher.finalize())
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
