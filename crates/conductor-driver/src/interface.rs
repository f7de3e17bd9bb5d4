// SPDX-License-Identifier: MIT

//! Capability-slot contracts every driver interface implements (spec §4.6).
//!
//! The core never talks to a concrete driver type, only to these traits —
//! the "capability-based driver façade" from spec §4.6, replacing the
//! source's dynamic by-name plugin loading with a static interface bundle
//! (spec §9 redesign note).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use conductor_core::error::DriverError;
use conductor_core::{Node, Port, Portgroup, PowerState, StepDescriptor};
use conductor_fsm::Workflow;

/// A read-only snapshot of the node (plus its ports/portgroups) a driver call
/// operates against. Bundled by `conductor-task`'s `Task` from the row it
/// holds the reservation on; driver code never sees the lock itself.
#[derive(Debug, Clone)]
pub struct TaskView {
    pub node: Node,
    pub ports: Vec<Port>,
    pub portgroups: Vec<Portgroup>,
    /// Whether this task holds only a shared (non-exclusive) lock — mutating
    /// driver operations must not be called when this is true.
    pub shared: bool,
}

/// The minimum contract every interface slot satisfies (spec §4.6).
#[async_trait]
pub trait Interface: Send + Sync {
    /// Static properties this interface contributes (vendor docs, constants).
    fn get_properties(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Validate that this interface can operate on the given task — e.g.
    /// required `driver_info` keys are present. Called before every
    /// workflow step sequence runs (spec §4.4 step 2: "power.validate
    /// always; plus the step's own interface").
    async fn validate(&self, task: &TaskView) -> Result<(), DriverError>;
}

/// Outcome of one `execute_<workflow>_step` call (spec §4.4 step 4).
///
/// A third "any other value" outcome exists in the source; here it is
/// represented as `Err(DriverError::ContractViolation(..))` instead of a
/// third enum variant, since Rust's `Result` already gives driver authors a
/// typed way to say "this call failed" versus "this call is still pending" —
/// collapsing the source's three-way sentinel into the idiomatic two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Wait,
}

/// Outcome of `DeployInterface::prepare` (spec §4.4 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    Ready,
    Wait,
}

/// The power-cycling capability slot. Owns both the power-step sequence
/// entries (`power.validate` runs before every workflow) and the
/// get/set-power-state calls the periodic power-sync loop drives.
#[async_trait]
pub trait PowerInterface: Interface {
    /// Steps this interface contributes to `workflow`, in declaration order
    /// (the step cache sorts by priority once collected across interfaces).
    fn advertise_steps(&self, workflow: Workflow) -> Vec<StepDescriptor> {
        let _ = workflow;
        Vec::new()
    }

    async fn execute_step(
        &self,
        task: &TaskView,
        step: &StepDescriptor,
    ) -> Result<StepOutcome, DriverError>;

    async fn get_power_state(&self, task: &TaskView) -> Result<PowerState, DriverError>;

    async fn set_power_state(&self, task: &TaskView, target: PowerState) -> Result<(), DriverError>;
}

/// Out-of-band management: sensors, boot-device passthrough for hardware
/// that doesn't expose it via the boot interface, and management-tagged
/// steps.
#[async_trait]
pub trait ManagementInterface: Interface {
    fn advertise_steps(&self, workflow: Workflow) -> Vec<StepDescriptor> {
        let _ = workflow;
        Vec::new()
    }

    async fn execute_step(
        &self,
        task: &TaskView,
        step: &StepDescriptor,
    ) -> Result<StepOutcome, DriverError>;

    /// Filtered by `send_sensor_data_types` upstream of this call (spec §4.5
    /// sensor shipper).
    async fn get_sensors_data(&self, task: &TaskView) -> Result<HashMap<String, Value>, DriverError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootDeviceInfo {
    pub device: String,
    pub persistent: bool,
}

/// Controls which device the node boots from.
#[async_trait]
pub trait BootInterface: Interface {
    async fn set_boot_device(
        &self,
        task: &TaskView,
        device: &str,
        persistent: bool,
    ) -> Result<(), DriverError>;

    async fn get_boot_device(&self, task: &TaskView) -> Result<BootDeviceInfo, DriverError>;

    fn get_supported_boot_devices(&self) -> Vec<String>;
}

/// Deploy-and-teardown orchestration. Uniquely among the capability slots,
/// `prepare`/`tear_down` are workflow-polymorphic: the source calls
/// `deploy.prepare_cleaning` for the clean workflow and `deploy.prepare` for
/// deploy, both implemented on the same interface (spec §4.4). Here that's
/// one method parameterised by `Workflow` rather than one method per
/// workflow name.
#[async_trait]
pub trait DeployInterface: Interface {
    fn advertise_steps(&self, workflow: Workflow) -> Vec<StepDescriptor>;

    async fn prepare(&self, task: &TaskView, workflow: Workflow) -> Result<PrepareOutcome, DriverError>;

    async fn tear_down(&self, task: &TaskView, workflow: Workflow) -> Result<(), DriverError>;

    /// Re-establishes this conductor's ownership of an already-deployed node
    /// during takeover (spec §4.5 "Takeover / rebalancer"). Unlike
    /// `prepare`, the node is already `ACTIVE`; the default implementation
    /// is a no-op for drivers with nothing stateful to reattach.
    async fn take_over(&self, task: &TaskView) -> Result<(), DriverError> {
        let _ = task;
        Ok(())
    }

    async fn execute_step(
        &self,
        task: &TaskView,
        step: &StepDescriptor,
    ) -> Result<StepOutcome, DriverError>;

    /// Stores a caller-supplied configdrive for a deploy. Returns either the
    /// literal payload or a temporary URL, per the inline-vs-uploaded
    /// threshold rule the step executor applies before calling this (spec
    /// §4.4 "Deploy-specific wrappers").
    async fn store_configdrive(
        &self,
        task: &TaskView,
        configdrive: &str,
    ) -> Result<(), DriverError> {
        let _ = (task, configdrive);
        Ok(())
    }
}

/// Console session management.
#[async_trait]
pub trait ConsoleInterface: Interface {
    async fn start_console(&self, task: &TaskView) -> Result<(), DriverError>;
    async fn stop_console(&self, task: &TaskView) -> Result<(), DriverError>;
    async fn get_console_url(&self, task: &TaskView) -> Result<String, DriverError>;
    fn console_enabled(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Metadata for one named vendor-passthru route (spec §4.6).
#[derive(Debug, Clone)]
pub struct VendorRoute {
    pub name: String,
    pub http_methods: Vec<HttpMethod>,
    pub is_async: bool,
    /// Whether this route may attach (upgrade) the calling task's lock to
    /// exclusive before dispatching.
    pub attach: bool,
    pub description: String,
}

/// Named, dynamically dispatched vendor-specific operations.
#[async_trait]
pub trait VendorInterface: Interface {
    fn routes(&self) -> Vec<VendorRoute>;

    async fn dispatch(
        &self,
        task: &TaskView,
        method: &str,
        http_method: HttpMethod,
        args: &HashMap<String, Value>,
    ) -> Result<Value, DriverError>;
}

/// RAID configuration, plus RAID-tagged clean/deploy steps.
#[async_trait]
pub trait RaidInterface: Interface {
    fn advertise_steps(&self, workflow: Workflow) -> Vec<StepDescriptor> {
        let _ = workflow;
        Vec::new()
    }

    async fn execute_step(
        &self,
        task: &TaskView,
        step: &StepDescriptor,
    ) -> Result<StepOutcome, DriverError>;

    async fn set_target_raid_config(&self, task: &TaskView, config: &Value) -> Result<(), DriverError>;

    fn get_logical_disk_properties(&self) -> HashMap<String, Value>;
}

/// BIOS settings management, plus BIOS-tagged clean/deploy steps.
#[async_trait]
pub trait BiosInterface: Interface {
    fn advertise_steps(&self, workflow: Workflow) -> Vec<StepDescriptor> {
        let _ = workflow;
        Vec::new()
    }

    async fn execute_step(
        &self,
        task: &TaskView,
        step: &StepDescriptor,
    ) -> Result<StepOutcome, DriverError>;
}

/// Hardware introspection.
#[async_trait]
pub trait InspectInterface: Interface {
    async fn inspect_hardware(&self, task: &TaskView) -> Result<HashMap<String, Value>, DriverError>;
}
