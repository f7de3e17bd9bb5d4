// SPDX-License-Identifier: MIT

//! The deploy/clean/inspect wait-state timeout sweepers (spec §4.5): a node
//! left in a `*_WAIT` state past its configured callback window is failed
//! automatically rather than waiting forever for a callback that may never
//! arrive. Clean additionally clears its step-list bookkeeping so a later
//! retry can't replay a stale step sequence (spec §8 scenario 4).

use conductor_core::error::ConductorError;
use conductor_core::{Clock, Node, NodeId};
use conductor_fsm::{ProvisionEvent, ProvisionState};
use conductor_store::{NodeFilter, NodeSort};

use crate::context::ServiceContext;
use crate::periodic::{candidates_local, classify_error, clear_workflow_step_state, NodeOutcome};

fn noop(_node: &mut Node) {}

fn clear_clean(node: &mut Node) {
    clear_workflow_step_state(node, "clean");
}

fn clear_inspect(node: &mut Node) {
    node.inspection_started_at = None;
}

pub async fn run_deploy_timeout<C: Clock + 'static>(ctx: &ServiceContext<C>) -> Result<(), ConductorError> {
    let cutoff = ctx.clock.epoch_ms().saturating_sub(ctx.settings.callback_timeouts.deploy_callback_timeout_ms);
    let filter = NodeFilter::new().provision_state(vec![ProvisionState::DeployWait]).provisioned_before_ms(cutoff);
    sweep(ctx, filter, ProvisionState::DeployWait, "deploy callback", noop).await
}

pub async fn run_clean_timeout<C: Clock + 'static>(ctx: &ServiceContext<C>) -> Result<(), ConductorError> {
    let cutoff = ctx.clock.epoch_ms().saturating_sub(ctx.settings.callback_timeouts.clean_callback_timeout_ms);
    let filter = NodeFilter::new().provision_state(vec![ProvisionState::CleanWait]).provisioned_before_ms(cutoff);
    sweep(ctx, filter, ProvisionState::CleanWait, "clean callback", clear_clean).await
}

pub async fn run_inspect_timeout<C: Clock + 'static>(ctx: &ServiceContext<C>) -> Result<(), ConductorError> {
    let cutoff = ctx.clock.epoch_ms().saturating_sub(ctx.settings.callback_timeouts.inspect_callback_timeout_ms);
    let filter = NodeFilter::new().provision_state(vec![ProvisionState::InspectWait]).provisioned_before_ms(cutoff);
    sweep(ctx, filter, ProvisionState::InspectWait, "inspection callback", clear_inspect).await
}

async fn sweep<C: Clock + 'static>(
    ctx: &ServiceContext<C>,
    filter: NodeFilter,
    expected: ProvisionState,
    what: &str,
    clear: fn(&mut Node),
) -> Result<(), ConductorError> {
    let candidates = candidates_local(ctx, filter, NodeSort::ProvisionUpdatedAtAsc).await?;
    for node in candidates {
        if let Err(e) = timeout_one(ctx, node.id, expected, what, clear).await {
            match classify_error(&e) {
                NodeOutcome::StopTick => return Err(e),
                NodeOutcome::Continue => {
                    tracing::warn!(node_id = %node.id, error = %e, "timeout sweep failed for node");
                }
            }
        }
        tokio::task::yield_now().await;
    }
    Ok(())
}

async fn timeout_one<C: Clock + 'static>(
    ctx: &ServiceContext<C>,
    node_id: NodeId,
    expected: ProvisionState,
    what: &str,
    clear: fn(&mut Node),
) -> Result<(), ConductorError> {
    let mut task = ctx.tasks.acquire(node_id, true, "timeout_sweep").await?;
    task.upgrade().await?;

    if task.node.provision_state != expected {
        return task.release().await;
    }

    let message = format!("timed out waiting for {what}");
    task.mutate(move |n| {
        clear(n);
        n.last_error = Some(message);
    })
    .await?;

    task.process_event(ctx.primary_pool.as_ref(), ProvisionEvent::Fail, |task| async move {
        let _ = task.release().await;
    })
    .await
}

#[cfg(test)]
#[path = "timeouts_tests.rs"]
mod tests;
