// SPDX-License-Identifier: MIT

//! The collaborators every RPC handler and periodic loop shares, bundled so
//! neither `api` nor `periodic` needs its own copy of the wiring (spec §4.3
//! "orchestrates all of the above").

use std::collections::HashMap;
use std::sync::Arc;

use conductor_core::{Clock, ConductorId, NodeId, Settings};
use conductor_driver::DriverRegistry;
use conductor_executor::StepExecutor;
use conductor_ring::HashRing;
use conductor_store::NodeStore;
use conductor_task::{BoundedWorkerPool, TaskManager};
use parking_lot::Mutex;

/// Shared state behind an `Arc`, handed to RPC handlers and periodic loops
/// alike. Cloning a `ServiceContext` clones the `Arc`, not the state.
pub struct ServiceContext<C: Clock> {
    pub store: Arc<dyn NodeStore>,
    pub drivers: Arc<DriverRegistry>,
    pub ring: Arc<HashRing>,
    pub host: ConductorId,
    pub clock: C,
    pub settings: Settings,
    pub tasks: Arc<TaskManager<C>>,
    pub executor: Arc<StepExecutor>,
    /// The primary worker pool `SpawnAfter` schedules ordinary workflow
    /// continuations onto.
    pub primary_pool: Arc<BoundedWorkerPool>,
    /// A small pool reserved for heartbeat-reply paths, so a saturated
    /// primary pool can never starve keepalives (spec §4.3 step 4).
    pub heartbeat_pool: Arc<BoundedWorkerPool>,
    /// Per-node consecutive power-sync discrepancy counts. Kept in-process
    /// rather than persisted — it is reconciliation bookkeeping, not node
    /// state, and resets naturally if this conductor restarts (spec §4.5
    /// "power sync").
    pub power_sync_failures: Mutex<HashMap<NodeId, u32>>,
}

impl<C: Clock> ServiceContext<C> {
    pub fn bump_power_sync_failures(&self, node_id: NodeId) -> u32 {
        let mut failures = self.power_sync_failures.lock();
        let count = failures.entry(node_id).or_insert(0);
        *count += 1;
        *count
    }

    pub fn reset_power_sync_failures(&self, node_id: NodeId) {
        self.power_sync_failures.lock().remove(&node_id);
    }
}
