// SPDX-License-Identifier: MIT

//! The optional sensor shipper (spec §4.5 "Sensor shipper"): periodically
//! fetches each locally-owned node's sensor data, filtered by
//! `send_sensor_data_types`. Publishing the collected readings to an
//! external telemetry sink is deliberately out of scope (spec's explicit
//! non-goal on sensor telemetry shipping) — this loop stops at the
//! filtered fetch and logs what it collected.

use std::collections::HashMap;

use conductor_core::error::ConductorError;
use conductor_core::{Clock, NodeId};
use conductor_driver::ManagementInterface as _;
use conductor_store::{NodeFilter, NodeSort};

use crate::context::ServiceContext;
use crate::periodic::{candidates_local, classify_error, NodeOutcome};

pub async fn run_once<C: Clock + 'static>(ctx: &ServiceContext<C>) -> Result<(), ConductorError> {
    if !ctx.settings.sensors.enabled {
        return Ok(());
    }

    let filter = NodeFilter::new().maintenance(false);
    let candidates = candidates_local(ctx, filter, NodeSort::None).await?;
    for node in candidates {
        if let Err(e) = collect_one(ctx, node.id).await {
            match classify_error(&e) {
                NodeOutcome::StopTick => return Err(e),
                NodeOutcome::Continue => {
                    tracing::debug!(node_id = %node.id, error = %e, "sensor collection failed for node");
                }
            }
        }
        tokio::task::yield_now().await;
    }
    Ok(())
}

async fn collect_one<C: Clock + 'static>(ctx: &ServiceContext<C>, node_id: NodeId) -> Result<(), ConductorError> {
    let task = ctx.tasks.acquire(node_id, true, "sensor_shipper").await?;
    let view = task.view();
    let data = task.driver.management.get_sensors_data(&view).await?;

    let wanted = &ctx.settings.sensors.send_sensor_data_types;
    let filtered: HashMap<_, _> = if wanted.iter().any(|t| t == "ALL") {
        data
    } else {
        data.into_iter().filter(|(k, _)| wanted.contains(k)).collect()
    };

    tracing::debug!(node_id = %node_id, sensor_type_count = filtered.len(), "collected sensor data");
    task.release().await
}

#[cfg(test)]
#[path = "sensors_tests.rs"]
mod tests;
