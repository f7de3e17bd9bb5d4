// SPDX-License-Identifier: MIT

//! Process-level orchestration (spec §4.3): register with the `Conductor`
//! table, load the hash ring, clear anything this host reserved in a prior
//! life, start the two worker pools, and drive the heartbeat and periodic
//! loops for as long as the process runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use conductor_core::error::ConductorError;
use conductor_core::{Backoff, Clock, Conductor, ConductorId, Settings};
use conductor_driver::DriverRegistry;
use conductor_executor::StepExecutor;
use conductor_ring::HashRing;
use conductor_store::{NodeFilter, NodeStore};
use conductor_task::{BoundedWorkerPool, TaskManager};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::context::ServiceContext;
use crate::periodic;

/// A running conductor process: the shared [`ServiceContext`] plus the
/// background tasks (heartbeat, periodic loop) driving it.
pub struct ConductorService<C: Clock + 'static> {
    pub ctx: Arc<ServiceContext<C>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Clock + 'static> ConductorService<C> {
    /// Runs the startup sequence (spec §4.3): upsert this host's `Conductor`
    /// row, rebuild the hash ring from current membership, and clear any
    /// reservation or in-flight power target this host left behind from a
    /// prior crash (spec §4.2: "a conductor that restarts must not leave
    /// nodes locked to a process that no longer exists").
    pub async fn start(
        settings: Settings,
        store: Arc<dyn NodeStore>,
        drivers: Arc<DriverRegistry>,
        clock: C,
    ) -> Result<Self, ConductorError> {
        let host = ConductorId::new(if settings.hostname.is_empty() {
            hostname_or_fallback()
        } else {
            settings.hostname.clone()
        });

        store
            .upsert_conductor(Conductor {
                id: host.clone(),
                hardware_types: settings.hardware_types.clone(),
                updated_at_ms: clock.epoch_ms(),
            })
            .await?;

        let ring = Arc::new(HashRing::new(settings.hash_ring.replicas));
        let members = store.list_conductors().await?.into_iter().map(|c| c.id).collect::<Vec<_>>();
        ring.rebuild(&members);

        Self::clear_stale_reservations(store.as_ref(), &host).await?;

        let tasks = Arc::new(TaskManager::new(
            store.clone(),
            drivers.clone(),
            host.clone(),
            clock.clone(),
            Backoff::new(
                settings.lock.acquire_retry_interval_ms,
                settings.lock.acquire_retry_interval_ms.saturating_mul(8),
                settings.lock.acquire_retries,
            ),
        ));
        let executor = Arc::new(StepExecutor::new(
            drivers.clone(),
            Arc::new(conductor_executor::configdrive::JsonConfigDriveBuilder),
            Arc::new(conductor_executor::configdrive::InMemoryObjectStore::default()),
            &settings,
        ));

        let primary_pool = Arc::new(BoundedWorkerPool::new(settings.worker_pools.primary_capacity));
        let heartbeat_pool = Arc::new(BoundedWorkerPool::new(settings.worker_pools.heartbeat_capacity));

        let ctx = Arc::new(ServiceContext {
            store,
            drivers,
            ring,
            host,
            clock,
            settings,
            tasks,
            executor,
            primary_pool,
            heartbeat_pool,
            power_sync_failures: Mutex::new(HashMap::new()),
        });

        let heartbeat = Self::spawn_heartbeat(ctx.clone());
        let periodic = Self::spawn_periodic(ctx.clone());

        Ok(Self { ctx, heartbeat: Mutex::new(Some(heartbeat)), periodic: Mutex::new(Some(periodic)) })
    }

    /// Finds every node this host still holds a `reservation` on and every
    /// `target_power_state` it left set, and clears both — whatever worker
    /// held them died with the previous process.
    async fn clear_stale_reservations(store: &dyn NodeStore, host: &ConductorId) -> Result<(), ConductorError> {
        let filter = NodeFilter::new().reservation(Some(host.as_str().to_string()));
        let stale = store.list_node_info(&filter, Default::default()).await?;
        for node in stale {
            let expected_version = node.version;
            let mut next = node;
            next.reservation = None;
            next.target_power_state = None;
            if let Err(e) = store.update_node(conductor_store::NodeDiff { expected_version, node: next }).await {
                tracing::warn!(error = %e, "could not clear a stale reservation at startup");
            }
        }
        Ok(())
    }

    /// Re-stamps this host's `Conductor` row on a fixed interval so peers'
    /// `list_offline_conductors` never mistakes a live process for a dead
    /// one (spec §4.3 step 4, §4.7 "heartbeat").
    fn spawn_heartbeat(ctx: Arc<ServiceContext<C>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let interval = Duration::from_millis(ctx.settings.heartbeat.interval_ms.max(1));
            loop {
                tokio::time::sleep(interval).await;
                let conductor = Conductor {
                    id: ctx.host.clone(),
                    hardware_types: ctx.settings.hardware_types.clone(),
                    updated_at_ms: ctx.clock.epoch_ms(),
                };
                if let Err(e) = ctx.store.upsert_conductor(conductor).await {
                    tracing::warn!(error = %e, "conductor heartbeat failed");
                }
            }
        })
    }

    /// Runs [`periodic::run_tick`] on `settings.periodic.tick_interval_ms`
    /// for as long as the process lives (spec §4.5).
    fn spawn_periodic(ctx: Arc<ServiceContext<C>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let interval = Duration::from_millis(ctx.settings.periodic.tick_interval_ms.max(1));
            loop {
                tokio::time::sleep(interval).await;
                periodic::run_tick(ctx.as_ref()).await;
            }
        })
    }

    /// Stops the heartbeat and periodic loops. Does not drain in-flight
    /// worker-pool tasks; callers that need a clean exit should stop
    /// accepting new RPCs first and let outstanding `SpawnAfter`
    /// continuations finish on their own.
    pub async fn shutdown(&self) {
        if let Some(h) = self.heartbeat.lock().take() {
            h.abort();
        }
        if let Some(h) = self.periodic.lock().take() {
            h.abort();
        }
        if let Err(e) = self.ctx.store.remove_conductor(&self.ctx.host).await {
            tracing::warn!(error = %e, "could not remove conductor row on shutdown");
        }
    }
}

fn hostname_or_fallback() -> String {
    hostname_from_env().unwrap_or_else(|| "conductor-unknown".to_string())
}

fn hostname_from_env() -> Option<String> {
    std::env::var("HOSTNAME").ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
