// SPDX-License-Identifier: MIT

//! The external RPC surface (spec §6). Every method here is the
//! locality-checked, validate-then-spawn entry point spec §4.3 and §5
//! describe: look the node up, verify `HashRing::node_is_local`, forward if
//! not, otherwise acquire a [`Task`] and either apply a cheap synchronous
//! mutation or hand the driver I/O off to a worker pool via `SpawnAfter`
//! before returning (spec §5: "public RPC entry points must never block on
//! driver I/O").

use std::collections::HashMap;
use std::sync::Arc;

use conductor_core::error::{ClientError, ConductorError};
use conductor_core::{Clock, Node, Port, PortId, Portgroup, PortgroupId, PowerState, StepDescriptor};
use conductor_driver::{
    BiosInterface as _, BootDeviceInfo, BootInterface as _, ConsoleInterface as _, DeployInterface as _,
    HttpMethod, InspectInterface as _, Interface as _, ManagementInterface as _, PowerInterface as _,
    RaidInterface as _, VendorInterface as _, VendorRoute,
};
use conductor_executor::configdrive::ConfigDrive;
use conductor_fsm::{ProvisionEvent, ProvisionState, Workflow};
use conductor_store::NodeIdentity;
use conductor_task::Task;
use serde_json::Value;

use crate::context::ServiceContext;
use crate::forwarding::{NoForwarder, NodeForwarder};

/// The subset of `Node` columns `UpdateNode` is allowed to touch. Never
/// `driver_internal_info` — that namespace is private to the core (spec
/// §6: "external callers must not write to it").
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub driver_info: Option<HashMap<String, Value>>,
    pub instance_info: Option<HashMap<String, Value>>,
    pub instance_uuid: Option<Option<String>>,
    pub extra: Option<HashMap<String, Value>>,
    pub maintenance: Option<bool>,
    pub maintenance_reason: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct PortUpdate {
    pub portgroup_id: Option<Option<PortgroupId>>,
    pub pxe_enabled: Option<bool>,
    pub local_link_connection: Option<HashMap<String, Value>>,
    pub extra: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Default)]
pub struct PortgroupUpdate {
    pub name: Option<Option<String>>,
    pub extra: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone)]
pub struct ConsoleInformation {
    pub enabled: bool,
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DriverInterfaceResult {
    pub interface: &'static str,
    pub result: Result<(), String>,
}

/// States `DestroyNode` accepts: no active workflow, no attached instance.
/// Anything mid-workflow must go through `DoNodeTearDown` first.
fn is_destroyable(state: ProvisionState) -> bool {
    matches!(state, ProvisionState::Enroll | ProvisionState::Manageable | ProvisionState::Available | ProvisionState::Error)
}

/// The RPC surface (spec §6), bound to one conductor process's shared
/// wiring.
pub struct ConductorApi<C: Clock> {
    ctx: Arc<ServiceContext<C>>,
    forwarder: Arc<dyn NodeForwarder>,
}

impl<C: Clock + 'static> ConductorApi<C> {
    pub fn new(ctx: Arc<ServiceContext<C>>) -> Self {
        Self { ctx, forwarder: Arc::new(NoForwarder) }
    }

    pub fn with_forwarder(ctx: Arc<ServiceContext<C>>, forwarder: Arc<dyn NodeForwarder>) -> Self {
        Self { ctx, forwarder }
    }

    async fn ensure_local(&self, identity: &NodeIdentity, method: &str) -> Result<Node, ConductorError> {
        let node = self.ctx.store.get_node_by_identity(identity).await?;
        if self.ctx.ring.node_is_local(&node.id, &node.driver, &self.ctx.host) {
            return Ok(node);
        }
        let owner = self.ctx.ring.owner_for(&node.id, &node.driver).ok_or_else(|| {
            ConductorError::Internal(format!("node {} has no owning conductor in the current hash ring", node.id))
        })?;
        self.forwarder.forward(&owner, method).await?;
        Err(ConductorError::Internal(format!("{method}: forwarding to {owner} returned no result this core can relay")))
    }

    async fn acquire_local(
        &self,
        identity: impl Into<NodeIdentity>,
        shared: bool,
        purpose: &'static str,
    ) -> Result<Task<C>, ConductorError> {
        let identity = identity.into();
        self.ensure_local(&identity, purpose).await?;
        self.ctx.tasks.acquire(identity, shared, purpose).await
    }

    fn reject_if_maintenance(task: &Task<C>) -> Result<(), ConductorError> {
        if task.node.maintenance {
            return Err(ClientError::NodeInMaintenance(task.node.id.to_string()).into());
        }
        Ok(())
    }

    // ---- power -------------------------------------------------------

    /// `ChangeNodePowerState` (spec §6). Records the desired target
    /// immediately (so a racing read sees the in-flight request) and hands
    /// the actual hardware call off to the primary pool.
    pub async fn change_node_power_state(
        &self,
        identity: impl Into<NodeIdentity>,
        target: PowerState,
    ) -> Result<(), ConductorError> {
        let mut task = self.acquire_local(identity, false, "change_node_power_state").await?;
        if let Err(e) = Self::reject_if_maintenance(&task) {
            task.release().await?;
            return Err(e);
        }

        task.mutate(move |n| n.target_power_state = Some(target)).await?;

        match task.spawn_after(self.ctx.primary_pool.as_ref(), move |mut task| async move {
            let view = task.view();
            let result = task.driver.power.set_power_state(&view, target).await;
            match result {
                Ok(()) => {
                    let _ = task.mutate(move |n| {
                        n.power_state = target;
                        n.target_power_state = None;
                    })
                    .await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "power state change failed");
                    let _ = task.mutate(move |n| n.last_error = Some(e.to_string())).await;
                }
            }
            let _ = task.release().await;
        }) {
            Ok(()) => Ok(()),
            Err((err, mut task)) => {
                task.mutate(|n| n.target_power_state = None).await?;
                task.release().await?;
                Err(err.into())
            }
        }
    }

    // ---- node update / destroy ----------------------------------------

    /// `UpdateNode` (spec §6): mutates the caller-visible node columns.
    /// `driver_internal_info` is never exposed here (spec §6).
    pub async fn update_node(&self, identity: impl Into<NodeIdentity>, update: NodeUpdate) -> Result<Node, ConductorError> {
        let mut task = self.acquire_local(identity, false, "update_node").await?;
        task.mutate(move |n| {
            if let Some(name) = update.name {
                n.name = Some(name);
            }
            if let Some(v) = update.driver_info {
                n.driver_info = v;
            }
            if let Some(v) = update.instance_info {
                n.instance_info = v;
            }
            if let Some(v) = update.instance_uuid {
                n.instance_uuid = v;
            }
            if let Some(v) = update.extra {
                n.extra = v;
            }
            if let Some(v) = update.maintenance {
                n.maintenance = v;
            }
            if let Some(v) = update.maintenance_reason {
                n.maintenance_reason = v;
            }
        })
        .await?;
        let node = task.node.clone();
        task.release().await?;
        Ok(node)
    }

    /// `DestroyNode` (spec §6). Only legal from a resting, instance-free
    /// state; anything mid-workflow must go through `DoNodeTearDown` first.
    pub async fn destroy_node(&self, identity: impl Into<NodeIdentity>) -> Result<(), ConductorError> {
        let task = self.acquire_local(identity, false, "destroy_node").await?;
        if task.node.instance_uuid.is_some() {
            let id = task.node.id.to_string();
            task.release().await?;
            return Err(ClientError::NodeAssociated(id).into());
        }
        if !is_destroyable(task.node.provision_state) {
            let state = task.node.provision_state;
            let id = task.node.id.to_string();
            task.release().await?;
            return Err(ClientError::InvalidStateRequested(format!("cannot destroy node {id} while in {state}")).into());
        }
        let id = task.node.id;
        task.release().await?;
        self.ctx.store.delete_node(id).await
    }

    // ---- deploy / clean / service workflows ---------------------------

    /// `DoNodeDeploy(rebuild?, configdrive?)` (spec §6/§4.4).
    pub async fn do_node_deploy(
        &self,
        identity: impl Into<NodeIdentity>,
        rebuild: bool,
        configdrive: Option<ConfigDrive>,
    ) -> Result<(), ConductorError> {
        let mut task = self.acquire_local(identity, false, "do_node_deploy").await?;
        if let Err(e) = Self::reject_if_maintenance(&task) {
            task.release().await?;
            return Err(e);
        }

        if let Some(cd) = configdrive {
            self.ctx.executor.store_configdrive(&mut task, cd).await?;
        }

        let event = if rebuild { ProvisionEvent::Rebuild } else { ProvisionEvent::Deploy };
        let executor = self.ctx.executor.clone();
        let host = self.ctx.host.clone();
        task.process_event(self.ctx.primary_pool.as_ref(), event, move |mut task| async move {
            let result = executor.start(&mut task, Workflow::Deploy).await;
            if result.is_ok() && task.current_state() == ProvisionState::Active {
                let _ = task.mutate(move |n| n.conductor_affinity = Some(host)).await;
            } else if let Err(e) = &result {
                tracing::warn!(error = %e, "deploy workflow failed");
            }
            let _ = task.release().await;
        })
        .await
    }

    /// `DoNodeTearDown` (spec §6): ACTIVE/DEPLOYWAIT/DEPLOYFAIL -> DELETING
    /// -> CLEANING -> AVAILABLE (spec §4.1's delete/clean transitions).
    pub async fn do_node_tear_down(&self, identity: impl Into<NodeIdentity>) -> Result<(), ConductorError> {
        let task = self.acquire_local(identity, false, "do_node_tear_down").await?;
        let executor = self.ctx.executor.clone();
        task.process_event(self.ctx.primary_pool.as_ref(), ProvisionEvent::Delete, move |mut task| async move {
            if let Err(e) = task.apply_event(ProvisionEvent::Clean).await {
                tracing::warn!(error = %e, "tear down: could not enter cleaning");
                let _ = task.force_provision_state(ProvisionState::Error, None, Some(e.to_string())).await;
                let _ = task.release().await;
                return;
            }
            if let Err(e) = executor.start(&mut task, Workflow::Clean).await {
                tracing::warn!(error = %e, "tear down: clean workflow failed");
            }
            let _ = task.release().await;
        })
        .await
    }

    /// `DoNodeClean(steps)` (spec §6): an explicit clean request from
    /// MANAGEABLE, optionally restricted to a caller-chosen subset of the
    /// driver's advertised clean steps (preserving the caller's order).
    pub async fn do_node_clean(
        &self,
        identity: impl Into<NodeIdentity>,
        steps: Option<Vec<(String, String)>>,
    ) -> Result<(), ConductorError> {
        let mut task = self.acquire_local(identity, false, "do_node_clean").await?;
        if let Err(e) = Self::reject_if_maintenance(&task) {
            task.release().await?;
            return Err(e);
        }

        let chosen = match steps {
            Some(wanted) => Some(Self::select_steps(&self.ctx, &task.node.driver, Workflow::Clean, &wanted)?),
            None => None,
        };

        let executor = self.ctx.executor.clone();
        task.process_event(self.ctx.primary_pool.as_ref(), ProvisionEvent::Clean, move |mut task| async move {
            let result = match chosen {
                Some(steps) => executor.start_with_steps(&mut task, Workflow::Clean, steps).await,
                None => executor.start(&mut task, Workflow::Clean).await,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "clean workflow failed");
            }
            let _ = task.release().await;
        })
        .await
    }

    fn select_steps(
        ctx: &ServiceContext<C>,
        driver: &str,
        workflow: Workflow,
        wanted: &[(String, String)],
    ) -> Result<Vec<StepDescriptor>, ConductorError> {
        let advertised = ctx.drivers.steps_for(driver, workflow)?;
        wanted
            .iter()
            .map(|(interface, step)| {
                advertised
                    .iter()
                    .find(|s| &s.interface == interface && &s.step == step)
                    .cloned()
                    .ok_or_else(|| {
                        ClientError::InvalidParameterValue(format!(
                            "driver {driver} does not advertise step {interface}.{step} for {workflow:?}"
                        ))
                        .into()
                    })
            })
            .collect()
    }

    /// `ContinueNodeClean` (spec §6/§4.4 `continue_node_clean`).
    pub async fn continue_node_clean(
        &self,
        identity: impl Into<NodeIdentity>,
        skip_current_step: Option<bool>,
    ) -> Result<(), ConductorError> {
        self.continue_workflow(identity, Workflow::Clean, skip_current_step, "continue_node_clean").await
    }

    /// `ContinueNodeDeploy` (spec §6/§4.4 `continue_node_deploy`).
    pub async fn continue_node_deploy(
        &self,
        identity: impl Into<NodeIdentity>,
        skip_current_step: Option<bool>,
    ) -> Result<(), ConductorError> {
        self.continue_workflow(identity, Workflow::Deploy, skip_current_step, "continue_node_deploy").await
    }

    async fn continue_workflow(
        &self,
        identity: impl Into<NodeIdentity>,
        workflow: Workflow,
        skip_current_step: Option<bool>,
        purpose: &'static str,
    ) -> Result<(), ConductorError> {
        let task = self.acquire_local(identity, false, purpose).await?;
        let executor = self.ctx.executor.clone();
        let host = self.ctx.host.clone();
        match task.spawn_after(self.ctx.primary_pool.as_ref(), move |mut task| async move {
            let result = executor.resume(&mut task, workflow, skip_current_step).await;
            if result.is_ok() && workflow == Workflow::Deploy && task.current_state() == ProvisionState::Active {
                let _ = task.mutate(move |n| n.conductor_affinity = Some(host)).await;
            } else if let Err(e) = &result {
                tracing::warn!(error = %e, "workflow resume failed");
            }
            let _ = task.release().await;
        }) {
            Ok(()) => Ok(()),
            Err((err, task)) => {
                task.release().await?;
                Err(err.into())
            }
        }
    }

    /// `Heartbeat(callbackURL)` (spec §6): the deploy agent's periodic
    /// callback. On a node waiting for deploy, this is what resumes it;
    /// dispatched on the reserved heartbeat pool so a saturated primary
    /// pool can never starve keepalives (spec §4.3 step 4).
    pub async fn heartbeat(
        &self,
        identity: impl Into<NodeIdentity>,
        callback_url: Option<String>,
    ) -> Result<(), ConductorError> {
        let task = self.acquire_local(identity, false, "heartbeat").await?;
        if task.node.provision_state != ProvisionState::DeployWait {
            return task.release().await;
        }
        let executor = self.ctx.executor.clone();
        let host = self.ctx.host.clone();
        match task.spawn_after(self.ctx.heartbeat_pool.as_ref(), move |mut task| async move {
            if let Some(url) = callback_url {
                tracing::debug!(callback_url = %url, "agent heartbeat received");
            }
            let result = executor.resume(&mut task, Workflow::Deploy, None).await;
            if result.is_ok() && task.current_state() == ProvisionState::Active {
                let _ = task.mutate(move |n| n.conductor_affinity = Some(host)).await;
            }
            let _ = task.release().await;
        }) {
            Ok(()) => Ok(()),
            Err((err, task)) => {
                task.release().await?;
                Err(err.into())
            }
        }
    }

    /// `DoProvisioningAction(event)` (spec §6): the generic transition
    /// dispatcher covering every other state change the dedicated deploy/
    /// clean RPCs don't already cover.
    pub async fn do_provisioning_action(
        &self,
        identity: impl Into<NodeIdentity>,
        event: ProvisionEvent,
    ) -> Result<(), ConductorError> {
        let identity = identity.into();
        match event {
            ProvisionEvent::Deploy => self.do_node_deploy(identity, false, None).await,
            ProvisionEvent::Rebuild => self.do_node_deploy(identity, true, None).await,
            ProvisionEvent::Delete => self.do_node_tear_down(identity).await,
            ProvisionEvent::Clean | ProvisionEvent::Provide => self.do_node_clean(identity, None).await,
            ProvisionEvent::Service => self.do_node_service(identity).await,
            ProvisionEvent::Abort => {
                let mut task = self.acquire_local(identity, false, "abort").await?;
                self.ctx.executor.abort(&mut task, Workflow::Clean).await?;
                task.release().await
            }
            ProvisionEvent::Unhold => {
                let mut task = self.acquire_local(identity, false, "unhold").await?;
                task.apply_event(ProvisionEvent::Unhold).await?;
                task.release().await
            }
            ProvisionEvent::Manage => {
                let task = self.acquire_local(identity, false, "manage").await?;
                task.process_event(self.ctx.primary_pool.as_ref(), ProvisionEvent::Manage, move |mut task| async move {
                    let view = task.view();
                    let outcome = task.driver.power.validate(&view).await;
                    let next = if outcome.is_ok() { ProvisionEvent::Done } else { ProvisionEvent::Fail };
                    if let Err(e) = outcome {
                        let _ = task.mutate(move |n| n.last_error = Some(e.to_string())).await;
                    }
                    let _ = task.apply_event(next).await;
                    let _ = task.release().await;
                })
                .await
            }
            ProvisionEvent::Adopt => {
                let task = self.acquire_local(identity, false, "adopt").await?;
                task.process_event(self.ctx.primary_pool.as_ref(), ProvisionEvent::Adopt, move |mut task| async move {
                    let view = task.view();
                    let outcome = task.driver.deploy.take_over(&view).await;
                    let next = if outcome.is_ok() { ProvisionEvent::Done } else { ProvisionEvent::Fail };
                    if let Err(e) = outcome {
                        let _ = task.mutate(move |n| n.last_error = Some(e.to_string())).await;
                    }
                    let _ = task.apply_event(next).await;
                    let _ = task.release().await;
                })
                .await
            }
            ProvisionEvent::Inspect => self.inspect_hardware(identity).await,
            ProvisionEvent::Rescue => self.rescue_or_unrescue(identity, ProvisionEvent::Rescue, Workflow::Rescue).await,
            ProvisionEvent::Unrescue => {
                self.rescue_or_unrescue(identity, ProvisionEvent::Unrescue, Workflow::Rescue).await
            }
            ProvisionEvent::Wait | ProvisionEvent::Resume | ProvisionEvent::Done | ProvisionEvent::Fail => {
                Err(ClientError::InvalidStateRequested(format!(
                    "{event:?} is an internal transition, not a provisioning action a caller may request"
                ))
                .into())
            }
        }
    }

    async fn do_node_service(&self, identity: NodeIdentity) -> Result<(), ConductorError> {
        let task = self.acquire_local(identity, false, "do_node_service").await?;
        let executor = self.ctx.executor.clone();
        task.process_event(self.ctx.primary_pool.as_ref(), ProvisionEvent::Service, move |mut task| async move {
            if let Err(e) = executor.start(&mut task, Workflow::Service).await {
                tracing::warn!(error = %e, "service workflow failed");
            }
            let _ = task.release().await;
        })
        .await
    }

    /// Rescue/unrescue have no dedicated step-list workflow (the step
    /// executor only drives deploy/clean/service, spec §4.4); they reuse
    /// the deploy interface's generic `prepare`/`tear_down` pair the way
    /// the takeover loop reuses it for re-attachment (spec §4.5).
    async fn rescue_or_unrescue(
        &self,
        identity: NodeIdentity,
        event: ProvisionEvent,
        workflow: Workflow,
    ) -> Result<(), ConductorError> {
        let task = self.acquire_local(identity, false, "rescue").await?;
        task.process_event(self.ctx.primary_pool.as_ref(), event, move |mut task| async move {
            let view = task.view();
            let outcome = task.driver.deploy.prepare(&view, workflow).await;
            let next = match outcome {
                Ok(_) => ProvisionEvent::Done,
                Err(e) => {
                    let _ = task.mutate(move |n| n.last_error = Some(e.to_string())).await;
                    ProvisionEvent::Fail
                }
            };
            let _ = task.apply_event(next).await;
            let _ = task.release().await;
        })
        .await
    }

    /// `InspectHardware` (spec §6).
    pub async fn inspect_hardware(&self, identity: impl Into<NodeIdentity>) -> Result<(), ConductorError> {
        let task = self.acquire_local(identity, false, "inspect_hardware").await?;
        let now = self.ctx.clock.epoch_ms();
        task.process_event(self.ctx.primary_pool.as_ref(), ProvisionEvent::Inspect, move |mut task| async move {
            let view = task.view();
            let inspect = match task.driver.require_inspect() {
                Ok(i) => i.clone(),
                Err(e) => {
                    let _ = task.mutate(move |n| n.last_error = Some(e.to_string())).await;
                    let _ = task.apply_event(ProvisionEvent::Fail).await;
                    let _ = task.release().await;
                    return;
                }
            };
            let _ = task.mutate(move |n| n.inspection_started_at = Some(now)).await;
            let outcome = inspect.inspect_hardware(&view).await;
            let next = match outcome {
                Ok(_) => ProvisionEvent::Done,
                Err(e) => {
                    let _ = task.mutate(move |n| n.last_error = Some(e.to_string())).await;
                    ProvisionEvent::Fail
                }
            };
            let _ = task.apply_event(next).await;
            let _ = task.release().await;
        })
        .await
    }

    // ---- boot device ---------------------------------------------------

    /// `SetBootDevice` (spec §6). Persists the choice into
    /// `driver_internal_info` so a subsequent `GetBootDevice` observes the
    /// same value even if the (possibly stateless) driver doesn't retain it
    /// itself (spec §8: "set-then-get of boot_device round-trips").
    pub async fn set_boot_device(
        &self,
        identity: impl Into<NodeIdentity>,
        device: String,
        persistent: bool,
    ) -> Result<(), ConductorError> {
        let mut task = self.acquire_local(identity, false, "set_boot_device").await?;
        if let Err(e) = Self::reject_if_maintenance(&task) {
            task.release().await?;
            return Err(e);
        }
        let view = task.view();
        task.driver.boot.set_boot_device(&view, &device, persistent).await?;
        task.mutate(move |n| {
            n.driver_internal_info.insert(
                "boot_device".to_string(),
                serde_json::json!({"device": device, "persistent": persistent}),
            );
        })
        .await?;
        task.release().await
    }

    /// `GetBootDevice` (spec §6).
    pub async fn get_boot_device(&self, identity: impl Into<NodeIdentity>) -> Result<BootDeviceInfo, ConductorError> {
        let task = self.acquire_local(identity, true, "get_boot_device").await?;
        if let Some(stored) = task.node.driver_internal_info.get("boot_device") {
            if let (Some(device), Some(persistent)) =
                (stored.get("device").and_then(Value::as_str), stored.get("persistent").and_then(Value::as_bool))
            {
                let info = BootDeviceInfo { device: device.to_string(), persistent };
                task.release().await?;
                return Ok(info);
            }
        }
        let view = task.view();
        let info = task.driver.boot.get_boot_device(&view).await?;
        task.release().await?;
        Ok(info)
    }

    /// `GetSupportedBootDevices` (spec §6).
    pub async fn get_supported_boot_devices(&self, identity: impl Into<NodeIdentity>) -> Result<Vec<String>, ConductorError> {
        let task = self.acquire_local(identity, true, "get_supported_boot_devices").await?;
        let devices = task.driver.boot.get_supported_boot_devices();
        task.release().await?;
        Ok(devices)
    }

    // ---- driver interface validation -----------------------------------

    /// `ValidateDriverInterfaces` (spec §6): validate every present
    /// interface and report per-interface outcomes rather than
    /// short-circuiting on the first failure.
    pub async fn validate_driver_interfaces(
        &self,
        identity: impl Into<NodeIdentity>,
    ) -> Result<Vec<DriverInterfaceResult>, ConductorError> {
        let task = self.acquire_local(identity, true, "validate_driver_interfaces").await?;
        let view = task.view();
        let driver = task.driver.clone();
        let mut results = vec![
            DriverInterfaceResult { interface: "power", result: driver.power.validate(&view).await.map_err(|e| e.to_string()) },
            DriverInterfaceResult {
                interface: "management",
                result: driver.management.validate(&view).await.map_err(|e| e.to_string()),
            },
            DriverInterfaceResult { interface: "boot", result: driver.boot.validate(&view).await.map_err(|e| e.to_string()) },
            DriverInterfaceResult { interface: "deploy", result: driver.deploy.validate(&view).await.map_err(|e| e.to_string()) },
        ];
        if let Some(console) = &driver.console {
            results.push(DriverInterfaceResult { interface: "console", result: console.validate(&view).await.map_err(|e| e.to_string()) });
        }
        if let Some(raid) = &driver.raid {
            results.push(DriverInterfaceResult { interface: "raid", result: raid.validate(&view).await.map_err(|e| e.to_string()) });
        }
        if let Some(bios) = &driver.bios {
            results.push(DriverInterfaceResult { interface: "bios", result: bios.validate(&view).await.map_err(|e| e.to_string()) });
        }
        if let Some(inspect) = &driver.inspect {
            results.push(DriverInterfaceResult {
                interface: "inspect",
                result: inspect.validate(&view).await.map_err(|e| e.to_string()),
            });
        }
        task.release().await?;
        Ok(results)
    }

    // ---- console ---------------------------------------------------------

    /// `GetConsoleInformation` (spec §6).
    pub async fn get_console_information(&self, identity: impl Into<NodeIdentity>) -> Result<ConsoleInformation, ConductorError> {
        let task = self.acquire_local(identity, true, "get_console_information").await?;
        let console = task.driver.require_console()?.clone();
        let view = task.view();
        let enabled = console.console_enabled();
        let url = if enabled { console.get_console_url(&view).await.ok() } else { None };
        task.release().await?;
        Ok(ConsoleInformation { enabled, url })
    }

    /// `SetConsoleMode` (spec §6): start or stop the console session.
    pub async fn set_console_mode(&self, identity: impl Into<NodeIdentity>, enabled: bool) -> Result<(), ConductorError> {
        let task = self.acquire_local(identity, false, "set_console_mode").await?;
        let console = task.driver.require_console()?.clone();
        task.spawn_after(self.ctx.primary_pool.as_ref(), move |task| async move {
            let view = task.view();
            let result = if enabled { console.start_console(&view).await } else { console.stop_console(&view).await };
            if let Err(e) = result {
                tracing::warn!(error = %e, "set console mode failed");
            }
            let _ = task.release().await;
        })
        .map_err(|(err, _task)| err.into())
    }

    // ---- vendor passthru ---------------------------------------------------

    /// `GetNodeVendorPassthruMethods` (spec §6).
    pub async fn get_node_vendor_passthru_methods(&self, identity: impl Into<NodeIdentity>) -> Result<Vec<VendorRoute>, ConductorError> {
        let task = self.acquire_local(identity, true, "get_node_vendor_passthru_methods").await?;
        let routes = task.driver.require_vendor()?.routes();
        task.release().await?;
        Ok(routes)
    }

    /// `VendorPassthru` (spec §6): dispatch a named, node-scoped vendor
    /// route, honouring its HTTP-method whitelist and optional lock
    /// upgrade, either synchronously or by spawning for `is_async` routes.
    pub async fn vendor_passthru(
        &self,
        identity: impl Into<NodeIdentity>,
        method: &str,
        http_method: HttpMethod,
        args: HashMap<String, Value>,
    ) -> Result<Option<Value>, ConductorError> {
        let mut task = self.acquire_local(identity, true, "vendor_passthru").await?;
        let vendor = task.driver.require_vendor()?.clone();
        let route = vendor
            .routes()
            .into_iter()
            .find(|r| r.name == method)
            .ok_or_else(|| ClientError::UnsupportedDriverExtension(method.to_string()))?;
        if !route.http_methods.contains(&http_method) {
            return Err(ClientError::InvalidParameterValue(format!(
                "vendor route {method} does not accept {http_method:?}"
            ))
            .into());
        }
        if route.attach {
            task.upgrade().await?;
        }

        if route.is_async {
            let method = method.to_string();
            task.spawn_after(self.ctx.primary_pool.as_ref(), move |task| async move {
                let view = task.view();
                if let Err(e) = vendor.dispatch(&view, &method, http_method, &args).await {
                    tracing::warn!(error = %e, "async vendor passthru failed");
                }
                let _ = task.release().await;
            })
            .map_err(|(err, _task)| err.into())?;
            Ok(None)
        } else {
            let view = task.view();
            let result = vendor.dispatch(&view, method, http_method, &args).await;
            task.release().await?;
            Ok(Some(result?))
        }
    }

    /// `DriverVendorPassthru` (spec §6): a driver-level route not bound to
    /// any particular node. The interface contract requires a `TaskView`,
    /// so the reference implementation synthesises a placeholder one;
    /// drivers that expose driver-level routes are expected not to read
    /// node-specific fields from it.
    pub async fn driver_vendor_passthru(
        &self,
        hardware_type: &str,
        method: &str,
        http_method: HttpMethod,
        args: HashMap<String, Value>,
    ) -> Result<Value, ConductorError> {
        let driver = self.ctx.drivers.get(hardware_type)?;
        let vendor = driver.require_vendor()?;
        let route = vendor
            .routes()
            .into_iter()
            .find(|r| r.name == method)
            .ok_or_else(|| ClientError::UnsupportedDriverExtension(method.to_string()))?;
        if !route.http_methods.contains(&http_method) {
            return Err(ClientError::InvalidParameterValue(format!(
                "vendor route {method} does not accept {http_method:?}"
            ))
            .into());
        }
        let view = placeholder_view(hardware_type);
        Ok(vendor.dispatch(&view, method, http_method, &args).await?)
    }

    // ---- raid --------------------------------------------------------------

    /// `SetTargetRaidConfig` (spec §6).
    pub async fn set_target_raid_config(&self, identity: impl Into<NodeIdentity>, config: Value) -> Result<(), ConductorError> {
        let task = self.acquire_local(identity, false, "set_target_raid_config").await?;
        let raid = task.driver.require_raid()?.clone();
        let view = task.view();
        raid.set_target_raid_config(&view, &config).await?;
        task.release().await
    }

    /// `GetRaidLogicalDiskProperties` (spec §6): a driver-capability query,
    /// not tied to any particular node's current state.
    pub fn get_raid_logical_disk_properties(&self, hardware_type: &str) -> Result<HashMap<String, Value>, ConductorError> {
        let driver = self.ctx.drivers.get(hardware_type)?;
        Ok(driver.require_raid()?.get_logical_disk_properties())
    }

    // ---- ports / portgroups -------------------------------------------------

    /// `UpdatePort` (spec §3 "Port / Portgroup" mutation rules).
    pub async fn update_port(&self, port_id: PortId, update: PortUpdate) -> Result<Port, ConductorError> {
        let port = self.ctx.store.get_port(port_id).await?;
        let node = self.ctx.store.get_node_by_identity(&NodeIdentity::Id(port.node_id)).await?;

        if update.pxe_enabled.is_some() && !node.allows_pxe_change() {
            return Err(ClientError::InvalidStateRequested(
                "pxe_enabled may only change while MANAGEABLE or in maintenance".to_string(),
            )
            .into());
        }

        let expected_version = port.version;
        let mut next = port;
        if let Some(v) = update.portgroup_id {
            next.portgroup_id = v;
        }
        if let Some(v) = update.pxe_enabled {
            next.pxe_enabled = v;
        }
        if let Some(v) = update.local_link_connection {
            next.local_link_connection = v;
        }
        if let Some(v) = update.extra {
            next.extra = v;
        }
        self.ctx.store.update_port(expected_version, next).await
    }

    /// `UpdatePortgroup` (spec §3).
    pub async fn update_portgroup(&self, portgroup_id: PortgroupId, update: PortgroupUpdate) -> Result<Portgroup, ConductorError> {
        let portgroup = self.ctx.store.get_portgroup(portgroup_id).await?;
        let expected_version = portgroup.version;
        let mut next = portgroup;
        if let Some(v) = update.name {
            next.name = v;
        }
        if let Some(v) = update.extra {
            next.extra = v;
        }
        self.ctx.store.update_portgroup(expected_version, next).await
    }

    /// `DestroyPort` (spec §3).
    pub async fn destroy_port(&self, port_id: PortId) -> Result<(), ConductorError> {
        let port = self.ctx.store.get_port(port_id).await?;
        let node = self.ctx.store.get_node_by_identity(&NodeIdentity::Id(port.node_id)).await?;
        if !node.allows_mac_change() {
            return Err(ClientError::NodeAssociated(node.id.to_string()).into());
        }
        self.ctx.store.delete_port(port_id).await
    }

    /// `DestroyPortgroup` (spec §3: must be empty first, enforced by the
    /// store).
    pub async fn destroy_portgroup(&self, portgroup_id: PortgroupId) -> Result<(), ConductorError> {
        self.ctx.store.delete_portgroup(portgroup_id).await
    }
}

fn placeholder_view(hardware_type: &str) -> conductor_driver::TaskView {
    conductor_driver::TaskView {
        node: Node {
            id: conductor_core::NodeId::new(),
            name: None,
            driver: hardware_type.to_string(),
            driver_info: HashMap::new(),
            driver_internal_info: HashMap::new(),
            properties: HashMap::new(),
            instance_info: HashMap::new(),
            instance_uuid: None,
            extra: HashMap::new(),
            provision_state: ProvisionState::Enroll,
            target_provision_state: None,
            last_error: None,
            maintenance: false,
            maintenance_reason: None,
            reservation: None,
            conductor_affinity: None,
            deploy_step: None,
            clean_step: None,
            service_step: None,
            power_state: PowerState::PowerOff,
            target_power_state: None,
            provision_updated_at: 0,
            inspection_started_at: None,
            version: 0,
        },
        ports: Vec::new(),
        portgroups: Vec::new(),
        shared: true,
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
