// SPDX-License-Identifier: MIT

//! The unit of work every RPC handler and periodic loop operates through
//! (spec §4.2). [`TaskManager::acquire`] is the scoped-acquisition primitive
//! the spec's "`with acquire(...) as task:`" idiom redesigns into: an owned
//! [`Task`] value whose reservation is released on every exit path, either
//! explicitly via [`Task::release`] or, if the caller forgets, by `Drop`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use conductor_core::error::{ConcurrencyError, ConductorError};
use conductor_core::{Backoff, Clock, ConductorId, Node, NodeId, Port, Portgroup};
use conductor_fsm::{build_provision_fsm, Fsm, ProvisionEvent, ProvisionState};
use conductor_driver::{Driver, DriverRegistry, TaskView};
use conductor_store::{NodeDiff, NodeIdentity, NodeStore};
use parking_lot::Mutex;

use crate::pool::{BoxFuture, WorkerPool};

/// Tracks nodes with at least one outstanding shared reader on this
/// conductor process. The hash ring already guarantees only one conductor
/// ever operates on a given node at a time, so shared/exclusive exclusion
/// only needs to be enforced within this process (spec §4.2: "shared tasks
/// ... exclude exclusive writers").
type SharedReaders = Arc<Mutex<HashMap<NodeId, u32>>>;

/// Issues [`Task`]s against a [`NodeStore`] and [`DriverRegistry`] under this
/// conductor's hostname.
pub struct TaskManager<C: Clock> {
    store: Arc<dyn NodeStore>,
    drivers: Arc<DriverRegistry>,
    host: ConductorId,
    clock: C,
    backoff: Backoff,
    shared_readers: SharedReaders,
}

impl<C: Clock> TaskManager<C> {
    pub fn new(store: Arc<dyn NodeStore>, drivers: Arc<DriverRegistry>, host: ConductorId, clock: C, backoff: Backoff) -> Self {
        Self { store, drivers, host, clock, backoff, shared_readers: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn host(&self) -> &ConductorId {
        &self.host
    }

    /// Acquire a task on `identity`. Exclusive acquisition retries with
    /// backoff against both this process's shared-reader bookkeeping and the
    /// store's `reservation` column; shared acquisition never retries (spec
    /// §4.2).
    pub async fn acquire(
        &self,
        identity: impl Into<NodeIdentity>,
        shared: bool,
        purpose: impl Into<String>,
    ) -> Result<Task<C>, ConductorError> {
        let identity = identity.into();
        let purpose = purpose.into();
        let node = self.store.get_node_by_identity(&identity).await?;
        let id = node.id;

        let node = if shared {
            *self.shared_readers.lock().entry(id).or_insert(0) += 1;
            node
        } else {
            self.acquire_exclusive(id).await?
        };

        self.build_task(node, shared, purpose).await
    }

    async fn acquire_exclusive(&self, id: NodeId) -> Result<Node, ConductorError> {
        let seed = id.as_uuid().as_u128() as u64;
        let mut attempt = 0u32;
        loop {
            if self.shared_readers.lock().contains_key(&id) {
                match self.backoff.delay_for(attempt, seed) {
                    Some(delay_ms) => {
                        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                        attempt += 1;
                        continue;
                    }
                    None => return Err(ConcurrencyError::NodeLocked(id.to_string()).into()),
                }
            }
            match self.store.atomic_reserve(id, self.host.as_str()).await {
                Ok(node) => return Ok(node),
                Err(ConductorError::Concurrency(ConcurrencyError::NodeLocked(_))) => {
                    match self.backoff.delay_for(attempt, seed) {
                        Some(delay_ms) => {
                            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                            attempt += 1;
                        }
                        None => return Err(ConcurrencyError::NodeLocked(id.to_string()).into()),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn build_task(&self, node: Node, shared: bool, purpose: String) -> Result<Task<C>, ConductorError> {
        let ports = self.store.list_ports_for_node(node.id).await?;
        let portgroups = self.store.list_portgroups_for_node(node.id).await?;
        let driver = self.drivers.get(&node.driver)?;

        let mut fsm = build_provision_fsm();
        fsm.initialize(node.provision_state)
            .map_err(|e| ConductorError::Internal(format!("node in unknown provision state: {e}")))?;

        Ok(Task {
            store: self.store.clone(),
            shared_readers: self.shared_readers.clone(),
            host: self.host.clone(),
            clock: self.clock.clone(),
            backoff: self.backoff,
            node,
            ports,
            portgroups,
            driver,
            fsm,
            shared,
            released: false,
            purpose,
        })
    }
}

/// A bundle: the fresh [`Node`] row, its ports/portgroups, a driver instance,
/// and either an exclusive reservation or a shared read — released exactly
/// once, no matter how the caller's scope ends.
pub struct Task<C: Clock> {
    store: Arc<dyn NodeStore>,
    shared_readers: SharedReaders,
    host: ConductorId,
    clock: C,
    backoff: Backoff,
    pub node: Node,
    pub ports: Vec<Port>,
    pub portgroups: Vec<Portgroup>,
    pub driver: Arc<Driver>,
    fsm: Fsm<ProvisionState, ProvisionEvent>,
    shared: bool,
    released: bool,
    pub purpose: String,
}

impl<C: Clock> Task<C> {
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn current_state(&self) -> ProvisionState {
        self.fsm.current_state().copied().unwrap_or(self.node.provision_state)
    }

    pub fn target_state(&self) -> Option<ProvisionState> {
        self.fsm.target_state().copied()
    }

    /// A read-only snapshot to hand to driver calls.
    pub fn view(&self) -> TaskView {
        TaskView { node: self.node.clone(), ports: self.ports.clone(), portgroups: self.portgroups.clone(), shared: self.shared }
    }

    /// Promotes a shared task to exclusive in place (spec §4.2
    /// `UpgradeLock`). Re-reads the row so subsequent access observes the
    /// newest version.
    pub async fn upgrade(&mut self) -> Result<(), ConductorError> {
        if !self.shared {
            return Ok(());
        }
        let id = self.node.id;
        let seed = id.as_uuid().as_u128() as u64;
        let mut attempt = 0u32;
        loop {
            match self.store.atomic_reserve(id, self.host.as_str()).await {
                Ok(node) => {
                    let mut readers = self.shared_readers.lock();
                    if let Some(count) = readers.get_mut(&id) {
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            readers.remove(&id);
                        }
                    }
                    drop(readers);
                    self.node = node;
                    self.shared = false;
                    return Ok(());
                }
                Err(ConductorError::Concurrency(ConcurrencyError::NodeLocked(_))) => {
                    match self.backoff.delay_for(attempt, seed) {
                        Some(delay_ms) => {
                            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                            attempt += 1;
                        }
                        None => return Err(ConcurrencyError::NodeLocked(id.to_string()).into()),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply `event` to the in-memory FSM and persist the resulting
    /// `provision_state`/`target_provision_state` via a compare-and-swap
    /// write, stamping `provision_updated_at`.
    pub async fn apply_event(&mut self, event: ProvisionEvent) -> Result<(), ConductorError> {
        if self.shared {
            return Err(ConductorError::Internal("cannot mutate provision_state under a shared task".to_string()));
        }
        self.fsm.process_event(&event).map_err(|e| ConductorError::Internal(e.to_string()))?;
        let next_state = self
            .fsm
            .current_state()
            .copied()
            .ok_or_else(|| ConductorError::Internal("fsm uninitialized after transition".to_string()))?;
        let next_target = self.fsm.target_state().copied();

        let mut node = self.node.clone();
        node.provision_state = next_state;
        node.target_provision_state = next_target;
        node.provision_updated_at = self.clock.epoch_ms();
        let expected_version = node.version;
        self.node = self.store.update_node(NodeDiff { expected_version, node }).await?;
        Ok(())
    }

    /// Apply an arbitrary mutation to the node and persist it via
    /// compare-and-swap, without touching the FSM. Used by the step executor
    /// to write `driver_internal_info`'s step list/index and the
    /// `deploy_step`/`clean_step`/`service_step` cursor fields (spec §4.4),
    /// which `apply_event`/`force_provision_state` don't cover.
    pub async fn mutate(&mut self, f: impl FnOnce(&mut Node)) -> Result<(), ConductorError> {
        if self.shared {
            return Err(ConductorError::Internal("cannot mutate a node under a shared task".to_string()));
        }
        let mut node = self.node.clone();
        f(&mut node);
        let expected_version = node.version;
        self.node = self.store.update_node(NodeDiff { expected_version, node }).await?;
        Ok(())
    }

    /// Writes `state`/`target`/`last_error` directly, bypassing the FSM's
    /// transition table. Used for the roll-back rule (spec §7: "via the
    /// inverse event where defined, else by writing the prior state back")
    /// and by sweepers clearing step bookkeeping on timeout.
    pub async fn force_provision_state(
        &mut self,
        state: ProvisionState,
        target: Option<ProvisionState>,
        last_error: Option<String>,
    ) -> Result<(), ConductorError> {
        let mut node = self.node.clone();
        node.provision_state = state;
        node.target_provision_state = target;
        if let Some(err) = last_error {
            node.last_error = Some(err);
        }
        node.provision_updated_at = self.clock.epoch_ms();
        let expected_version = node.version;
        self.node = self.store.update_node(NodeDiff { expected_version, node }).await?;

        let mut fsm = build_provision_fsm();
        fsm.initialize(state).map_err(|e| ConductorError::Internal(e.to_string()))?;
        self.fsm = fsm;
        Ok(())
    }

    /// Release the reservation (or decrement the shared-reader count) right
    /// now, rather than waiting for `Drop`.
    pub async fn release(mut self) -> Result<(), ConductorError> {
        self.do_release().await
    }

    async fn do_release(&mut self) -> Result<(), ConductorError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if self.shared {
            let mut readers = self.shared_readers.lock();
            if let Some(count) = readers.get_mut(&self.node.id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    readers.remove(&self.node.id);
                }
            }
            Ok(())
        } else {
            self.store.atomic_release(self.node.id, self.host.as_str()).await
        }
    }

    /// Hand off to `pool`, transferring ownership of this task (and its
    /// reservation) to the continuation (spec §4.2 `SpawnAfter`). On
    /// saturation the task is handed back unchanged so the caller can revert
    /// whatever it already did.
    pub fn spawn_after<F, Fut>(self, pool: &dyn WorkerPool, continuation: F) -> Result<(), (ConcurrencyError, Task<C>)>
    where
        F: FnOnce(Task<C>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        C: 'static,
    {
        match pool.try_acquire() {
            Ok(permit) => {
                let fut: BoxFuture = Box::pin(continuation(self));
                pool.spawn(permit, fut);
                Ok(())
            }
            Err(e) => Err((e, self)),
        }
    }

    /// Atomically apply `event` and spawn `continuation` under the same
    /// reservation (spec §4.2 `ProcessEvent`). If scheduling fails, the
    /// transition is reverted (state written back verbatim) and `last_error`
    /// records the reason before the reservation is released.
    pub async fn process_event<F, Fut>(
        mut self,
        pool: &dyn WorkerPool,
        event: ProvisionEvent,
        continuation: F,
    ) -> Result<(), ConductorError>
    where
        F: FnOnce(Task<C>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        C: 'static,
    {
        let prior_state = self.current_state();
        let prior_target = self.target_state();

        self.apply_event(event).await?;

        match self.spawn_after(pool, continuation) {
            Ok(()) => Ok(()),
            Err((err, mut task)) => {
                let reason = format!("{err}");
                task.force_provision_state(prior_state, prior_target, Some(reason)).await?;
                task.release().await?;
                Err(ConductorError::Concurrency(err))
            }
        }
    }
}

impl<C: Clock> Drop for Task<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.shared {
            let mut readers = self.shared_readers.lock();
            if let Some(count) = readers.get_mut(&self.node.id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    readers.remove(&self.node.id);
                }
            }
        } else {
            let store = self.store.clone();
            let id = self.node.id;
            let host = self.host.as_str().to_string();
            tokio::spawn(async move {
                if let Err(err) = store.atomic_release(id, &host).await {
                    tracing::warn!(node_id = %id, error = %err, "failed to release reservation dropped without explicit release()");
                }
            });
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
