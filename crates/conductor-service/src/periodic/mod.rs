// SPDX-License-Identifier: MIT

//! The periodic reconciliation loops (spec §4.5): power sync, the
//! deploy/clean/inspect timeout sweepers, orphan recovery, and the
//! takeover/rebalancer. Every loop shares the same skeleton — enumerate
//! candidates, filter to nodes this conductor owns, acquire a shared task,
//! re-check the race, do the work, yield — factored into [`candidates_local`]
//! below so each loop file only has to write its own per-node logic.

pub mod orphan;
pub mod power_sync;
pub mod sensors;
pub mod takeover;
pub mod timeouts;

use std::sync::Arc;

use conductor_core::error::ConductorError;
use conductor_core::{Clock, Node};
use conductor_store::{NodeFilter, NodeSort};

use crate::context::ServiceContext;

/// Enumerates `filter`-matching nodes, keeps only the ones the hash ring
/// currently maps to this conductor, and caps the result at
/// `periodic_max_workers` (spec §4.5 "cap per-tick work").
pub(crate) async fn candidates_local<C: Clock>(
    ctx: &ServiceContext<C>,
    filter: NodeFilter,
    sort: NodeSort,
) -> Result<Vec<Node>, ConductorError> {
    let nodes = ctx.store.list_node_info(&filter, sort).await?;
    let cap = ctx.settings.periodic.periodic_max_workers;
    Ok(nodes.into_iter().filter(|n| ctx.ring.node_is_local(&n.id, &n.driver, &ctx.host)).take(cap).collect())
}

/// Clears the step-list bookkeeping a timed-out or orphaned workflow left
/// behind, so a later resume can't replay a stale step sequence (spec §8
/// scenario 4: "clean_step={}, clean_step_index absent").
pub(crate) fn clear_workflow_step_state(node: &mut Node, key: &str) {
    node.driver_internal_info.remove(&format!("{key}_steps"));
    node.driver_internal_info.remove(&format!("{key}_step_index"));
    node.driver_internal_info.remove(&format!("{key}_skip_step_default"));
    node.driver_internal_info.remove(&format!("{key}_abort_after"));
    match key {
        "deploy" => node.deploy_step = None,
        "clean" => node.clean_step = None,
        "service" => node.service_step = None,
        _ => {}
    }
}

/// One tick's outcome for a single candidate node: whether the loop should
/// keep going, or abandon the rest of this tick because the pool is
/// saturated (spec §7 "only NoFreeConductorWorker short-circuits the whole
/// tick").
pub(crate) enum NodeOutcome {
    Continue,
    StopTick,
}

pub(crate) fn classify_error(err: &ConductorError) -> NodeOutcome {
    use conductor_core::error::ConcurrencyError;
    match err {
        ConductorError::Concurrency(ConcurrencyError::NoFreeConductorWorker) => NodeOutcome::StopTick,
        _ => NodeOutcome::Continue,
    }
}

/// Runs every periodic loop once, in the fixed order spec §4.5 lists them.
/// Each loop's own per-node errors are already logged internally; a loop
/// that returns `Err` here simply ends its own tick early — the next loop
/// still runs (spec §7: `NoFreeConductorWorker` short-circuits *a* tick, not
/// the whole process).
pub async fn run_tick<C: Clock + 'static>(ctx: &ServiceContext<C>) {
    type LoopFuture<'a> = std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ConductorError>> + Send + 'a>>;
    let loops: Vec<(&str, LoopFuture)> = vec![
        ("power_sync", Box::pin(power_sync::run_once(ctx))),
        ("deploy_timeout", Box::pin(timeouts::run_deploy_timeout(ctx))),
        ("clean_timeout", Box::pin(timeouts::run_clean_timeout(ctx))),
        ("inspect_timeout", Box::pin(timeouts::run_inspect_timeout(ctx))),
        ("orphan_recovery", Box::pin(orphan::run_once(ctx))),
        ("takeover", Box::pin(takeover::run_once(ctx))),
        ("sensors", Box::pin(sensors::run_once(ctx))),
    ];
    for (name, fut) in loops {
        if let Err(e) = fut.await {
            tracing::warn!(loop_name = name, error = %e, "periodic loop tick ended early");
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
