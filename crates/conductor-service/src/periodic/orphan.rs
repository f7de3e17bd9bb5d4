// SPDX-License-Identifier: MIT

//! Orphan recovery (spec §4.5 "Orphan recovery"): when a conductor's
//! heartbeat goes stale, any node it still holds reserved is stuck mid
//! workflow forever unless another conductor clears the lease and fails the
//! node out of its transient state. `atomic_release` accepts the dead
//! conductor's own id as the `host` argument from any caller, which is
//! exactly the mechanism this loop relies on (spec §4.3 "a reservation
//! belonging to an offline conductor may be cleared by any other").

use conductor_core::error::ConductorError;
use conductor_core::{Clock, Conductor, ConductorId, NodeId};
use conductor_fsm::ProvisionEvent;
use conductor_store::{NodeFilter, NodeSort};

use crate::context::ServiceContext;
use crate::periodic::{candidates_local, classify_error, NodeOutcome};

pub async fn run_once<C: Clock + 'static>(ctx: &ServiceContext<C>) -> Result<(), ConductorError> {
    let now = ctx.clock.epoch_ms();
    let dead = ctx.store.list_offline_conductors(now, ctx.settings.periodic.conductor_offline_threshold_ms).await?;
    for conductor in dead {
        if let Err(e) = recover_conductor(ctx, &conductor).await {
            match classify_error(&e) {
                NodeOutcome::StopTick => return Err(e),
                NodeOutcome::Continue => {
                    tracing::warn!(conductor = %conductor.id, error = %e, "orphan recovery failed for conductor");
                }
            }
        }
    }
    Ok(())
}

async fn recover_conductor<C: Clock + 'static>(ctx: &ServiceContext<C>, dead: &Conductor) -> Result<(), ConductorError> {
    let filter = NodeFilter::new().reservation(Some(dead.id.as_str().to_string()));
    let orphans = candidates_local(ctx, filter, NodeSort::None).await?;
    for node in orphans {
        if let Err(e) = recover_node(ctx, &dead.id, node.id).await {
            match classify_error(&e) {
                NodeOutcome::StopTick => return Err(e),
                NodeOutcome::Continue => {
                    tracing::warn!(node_id = %node.id, error = %e, "failed to recover orphaned node");
                }
            }
        }
        tokio::task::yield_now().await;
    }
    Ok(())
}

async fn recover_node<C: Clock + 'static>(
    ctx: &ServiceContext<C>,
    dead_host: &ConductorId,
    node_id: NodeId,
) -> Result<(), ConductorError> {
    ctx.store.atomic_release(node_id, dead_host.as_str()).await?;
    let mut task = ctx.tasks.acquire(node_id, false, "orphan_recovery").await?;

    let message = format!("conductor {dead_host} went offline mid-workflow");
    task.mutate(move |n| n.last_error = Some(message)).await?;

    if let Err(e) = task.apply_event(ProvisionEvent::Fail).await {
        tracing::debug!(node_id = %node_id, error = %e, "orphaned node had no Fail transition from its state");
    }
    task.release().await
}

#[cfg(test)]
#[path = "orphan_tests.rs"]
mod tests;
