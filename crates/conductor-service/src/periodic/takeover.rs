// SPDX-License-Identifier: MIT

//! The takeover / rebalancer loop (spec §4.5 "Takeover / rebalancer"): when
//! the hash ring's membership changes (a conductor joins or leaves), some
//! `ACTIVE` nodes whose `conductor_affinity` still names the old owner now
//! map to this conductor. This loop re-attaches ownership by calling
//! `driver.deploy.prepare` + `driver.deploy.take_over`, and restarting the
//! console session if the driver exposes one, then stamps the new affinity.

use conductor_core::error::ConductorError;
use conductor_core::{Clock, NodeId};
use conductor_driver::ConsoleInterface as _;
use conductor_driver::DeployInterface as _;
use conductor_fsm::{ProvisionState, Workflow};
use conductor_store::{NodeFilter, NodeSort};

use crate::context::ServiceContext;
use crate::periodic::{candidates_local, classify_error, NodeOutcome};

pub async fn run_once<C: Clock + 'static>(ctx: &ServiceContext<C>) -> Result<(), ConductorError> {
    let filter = NodeFilter::new().provision_state(vec![ProvisionState::Active]).reservation(None);
    let candidates = candidates_local(ctx, filter, NodeSort::None).await?;
    for node in candidates {
        if node.conductor_affinity.as_ref() == Some(&ctx.host) {
            continue;
        }
        if let Err(e) = take_over_one(ctx, node.id).await {
            match classify_error(&e) {
                NodeOutcome::StopTick => return Err(e),
                NodeOutcome::Continue => {
                    tracing::warn!(node_id = %node.id, error = %e, "takeover failed for node");
                }
            }
        }
        tokio::task::yield_now().await;
    }
    Ok(())
}

async fn take_over_one<C: Clock + 'static>(ctx: &ServiceContext<C>, node_id: NodeId) -> Result<(), ConductorError> {
    let mut task = ctx.tasks.acquire(node_id, false, "takeover").await?;

    if task.node.provision_state != ProvisionState::Active || task.node.conductor_affinity.as_ref() == Some(&ctx.host)
    {
        return task.release().await;
    }

    let view = task.view();
    let _ = task.driver.deploy.prepare(&view, Workflow::Deploy).await?;
    task.driver.deploy.take_over(&view).await?;

    if let Some(console) = task.driver.console.clone() {
        if console.console_enabled() {
            if let Err(e) = console.start_console(&view).await {
                tracing::warn!(node_id = %node_id, error = %e, "takeover: failed to restart console session");
            }
        }
    }

    let host = ctx.host.clone();
    task.mutate(move |n| n.conductor_affinity = Some(host)).await?;
    task.release().await
}

#[cfg(test)]
#[path = "takeover_tests.rs"]
mod tests;
