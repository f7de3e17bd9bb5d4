// SPDX-License-Identifier: MIT

//! A deterministic, in-memory reference driver. Grounded on the spec's
//! seeded scenarios (happy deploy, async clean with abort, power sync) —
//! every interface here does just enough bookkeeping to make those
//! scenarios exercise real state transitions without touching real
//! hardware, mirroring how the source ships a "fake" driver purely for
//! test and demo wiring.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use conductor_core::error::DriverError;
use conductor_core::{NodeId, PowerState, StepDescriptor};
use conductor_fsm::Workflow;

use crate::interface::{
    BiosInterface, BootDeviceInfo, BootInterface, ConsoleInterface, DeployInterface,
    InspectInterface, Interface, ManagementInterface, PowerInterface, PrepareOutcome,
    RaidInterface, StepOutcome, TaskView,
};
use crate::registry::Driver;

/// Builds a fully-populated fake driver bundle under `name`, with every
/// optional slot present so integration tests can exercise console, vendor,
/// raid, bios and inspect paths without writing a second reference driver.
pub fn fake_driver(name: impl Into<String>) -> Arc<Driver> {
    Arc::new(Driver {
        name: name.into(),
        power: Arc::new(FakePower::default()),
        management: Arc::new(FakeManagement),
        boot: Arc::new(FakeBoot),
        deploy: Arc::new(FakeDeploy::default()),
        console: Some(Arc::new(FakeConsole::default())),
        vendor: None,
        raid: Some(Arc::new(FakeRaid)),
        bios: Some(Arc::new(FakeBios)),
        inspect: Some(Arc::new(FakeInspect)),
    })
}

#[derive(Default)]
struct FakePower {
    state: Mutex<HashMap<NodeId, PowerState>>,
}

#[async_trait]
impl Interface for FakePower {
    async fn validate(&self, _task: &TaskView) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl PowerInterface for FakePower {
    async fn execute_step(
        &self,
        _task: &TaskView,
        _step: &StepDescriptor,
    ) -> Result<StepOutcome, DriverError> {
        Ok(StepOutcome::Done)
    }

    async fn get_power_state(&self, task: &TaskView) -> Result<PowerState, DriverError> {
        Ok(self.state.lock().get(&task.node.id).copied().unwrap_or(PowerState::PowerOff))
    }

    async fn set_power_state(&self, task: &TaskView, target: PowerState) -> Result<(), DriverError> {
        self.state.lock().insert(task.node.id, target);
        Ok(())
    }
}

struct FakeManagement;

#[async_trait]
impl Interface for FakeManagement {
    async fn validate(&self, _task: &TaskView) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl ManagementInterface for FakeManagement {
    fn advertise_steps(&self, workflow: Workflow) -> Vec<StepDescriptor> {
        match workflow {
            Workflow::Clean => vec![StepDescriptor::new("management", "update_firmware", 30)],
            _ => Vec::new(),
        }
    }

    async fn execute_step(
        &self,
        _task: &TaskView,
        _step: &StepDescriptor,
    ) -> Result<StepOutcome, DriverError> {
        Ok(StepOutcome::Done)
    }

    async fn get_sensors_data(&self, _task: &TaskView) -> Result<HashMap<String, Value>, DriverError> {
        Ok(HashMap::from([("temperature".to_string(), Value::from(42))]))
    }
}

struct FakeBoot;

#[async_trait]
impl Interface for FakeBoot {
    async fn validate(&self, _task: &TaskView) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl BootInterface for FakeBoot {
    async fn set_boot_device(
        &self,
        _task: &TaskView,
        _device: &str,
        _persistent: bool,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn get_boot_device(&self, _task: &TaskView) -> Result<BootDeviceInfo, DriverError> {
        Ok(BootDeviceInfo { device: "pxe".to_string(), persistent: false })
    }

    fn get_supported_boot_devices(&self) -> Vec<String> {
        vec!["pxe".to_string(), "disk".to_string()]
    }
}

/// Tracks, per node, how many times a `deployment_reboot` step has been
/// invoked — the first call simulates the in-band agent going quiet across
/// the reboot, the second simulates it reconnecting (spec §4.4 oob-reboot
/// special case).
#[derive(Default)]
struct FakeDeploy {
    attempts: Mutex<HashMap<NodeId, u32>>,
}

#[async_trait]
impl Interface for FakeDeploy {
    async fn validate(&self, _task: &TaskView) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl DeployInterface for FakeDeploy {
    fn advertise_steps(&self, workflow: Workflow) -> Vec<StepDescriptor> {
        match workflow {
            Workflow::Deploy => vec![
                StepDescriptor::new("deploy", "write_image", 80),
                StepDescriptor::new("deploy", "agent_boot", 70).deployment_reboot(),
            ],
            Workflow::Clean => vec![StepDescriptor::new("deploy", "erase_disks", 90).abortable()],
            _ => Vec::new(),
        }
    }

    async fn prepare(&self, _task: &TaskView, _workflow: Workflow) -> Result<PrepareOutcome, DriverError> {
        Ok(PrepareOutcome::Ready)
    }

    async fn tear_down(&self, _task: &TaskView, _workflow: Workflow) -> Result<(), DriverError> {
        Ok(())
    }

    async fn execute_step(
        &self,
        task: &TaskView,
        step: &StepDescriptor,
    ) -> Result<StepOutcome, DriverError> {
        if step.deployment_reboot {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(task.node.id).or_insert(0);
            *count += 1;
            if *count == 1 {
                return Err(DriverError::InstanceDeployFailure("agent lost connection".to_string()));
            }
            return Ok(StepOutcome::Done);
        }
        Ok(StepOutcome::Done)
    }
}

#[derive(Default)]
struct FakeConsole {
    active: Mutex<bool>,
}

#[async_trait]
impl Interface for FakeConsole {
    async fn validate(&self, _task: &TaskView) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl ConsoleInterface for FakeConsole {
    async fn start_console(&self, _task: &TaskView) -> Result<(), DriverError> {
        *self.active.lock() = true;
        Ok(())
    }

    async fn stop_console(&self, _task: &TaskView) -> Result<(), DriverError> {
        *self.active.lock() = false;
        Ok(())
    }

    async fn get_console_url(&self, _task: &TaskView) -> Result<String, DriverError> {
        if *self.active.lock() {
            Ok("fake://console".to_string())
        } else {
            Err(DriverError::ConsoleError("console not started".to_string()))
        }
    }
}

struct FakeRaid;

#[async_trait]
impl Interface for FakeRaid {
    async fn validate(&self, _task: &TaskView) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl RaidInterface for FakeRaid {
    async fn execute_step(
        &self,
        _task: &TaskView,
        _step: &StepDescriptor,
    ) -> Result<StepOutcome, DriverError> {
        Ok(StepOutcome::Done)
    }

    async fn set_target_raid_config(&self, _task: &TaskView, _config: &Value) -> Result<(), DriverError> {
        Ok(())
    }

    fn get_logical_disk_properties(&self) -> HashMap<String, Value> {
        HashMap::new()
    }
}

struct FakeBios;

#[async_trait]
impl Interface for FakeBios {
    async fn validate(&self, _task: &TaskView) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl BiosInterface for FakeBios {
    async fn execute_step(
        &self,
        _task: &TaskView,
        _step: &StepDescriptor,
    ) -> Result<StepOutcome, DriverError> {
        Ok(StepOutcome::Done)
    }
}

struct FakeInspect;

#[async_trait]
impl Interface for FakeInspect {
    async fn validate(&self, _task: &TaskView) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl InspectInterface for FakeInspect {
    async fn inspect_hardware(&self, _task: &TaskView) -> Result<HashMap<String, Value>, DriverError> {
        Ok(HashMap::from([("cpus".to_string(), Value::from(4))]))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
