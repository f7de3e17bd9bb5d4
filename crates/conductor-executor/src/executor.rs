// SPDX-License-Identifier: MIT

//! The step execution loop (spec §4.4): persist steps+index, validate,
//! prepare, run steps in order with wait/resume/abort/skip semantics, the
//! oob-reboot special case, and completion.

use std::collections::HashSet;
use std::sync::Arc;

use conductor_core::error::{ClientError, ConductorError, DriverError};
use conductor_core::{Clock, Node, Settings, StepDescriptor};
use conductor_driver::{
    BiosInterface as _, DeployInterface as _, DriverRegistry, Interface as _, ManagementInterface as _,
    PowerInterface as _, PrepareOutcome, RaidInterface as _, StepOutcome,
};
use conductor_fsm::{ProvisionEvent, ProvisionState, Workflow};
use conductor_task::Task;

use crate::configdrive::{ConfigDrive, ConfigDriveBuilder, ObjectStore};

/// Runs deploy/clean/service workflows against a [`Task`]. Stateless beyond
/// its injected collaborators — all workflow state lives on the node row,
/// persisted through `Task::mutate`/`Task::apply_event`.
pub struct StepExecutor {
    registry: Arc<DriverRegistry>,
    configdrive_builder: Arc<dyn ConfigDriveBuilder>,
    object_store: Arc<dyn ObjectStore>,
    inline_max_bytes: usize,
    object_store_container: String,
    deploy_callback_timeout_ms: u64,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<DriverRegistry>,
        configdrive_builder: Arc<dyn ConfigDriveBuilder>,
        object_store: Arc<dyn ObjectStore>,
        settings: &Settings,
    ) -> Self {
        Self {
            registry,
            configdrive_builder,
            object_store,
            inline_max_bytes: settings.configdrive.inline_max_bytes,
            object_store_container: settings.configdrive.object_store_container.clone(),
            deploy_callback_timeout_ms: settings.callback_timeouts.deploy_callback_timeout_ms,
        }
    }

    /// Begin workflow `W`'s step sequence using the driver's advertised
    /// steps. Call once the node's FSM has already transitioned into the
    /// workflow's active state (e.g. via `task.apply_event(ProvisionEvent::
    /// Deploy)`), typically from inside a `SpawnAfter` continuation.
    pub async fn start<C: Clock>(&self, task: &mut Task<C>, workflow: Workflow) -> Result<(), ConductorError> {
        let steps = self.registry.steps_for(&task.node.driver, workflow)?;
        self.start_with_steps(task, workflow, steps).await
    }

    /// Like [`Self::start`], but with a caller-supplied step list instead of
    /// the driver's full advertised set — the manual clean-steps path
    /// (spec §6 `DoNodeClean(steps)`). Every step must already be advertised
    /// by the driver; callers are expected to have filtered/ordered the
    /// registry's list before calling this.
    pub async fn start_with_steps<C: Clock>(
        &self,
        task: &mut Task<C>,
        workflow: Workflow,
        steps: Vec<StepDescriptor>,
    ) -> Result<(), ConductorError> {
        let key = workflow_key(workflow)?;

        if steps.is_empty() {
            return self.finish(task, key, workflow).await;
        }

        self.persist_steps(task, key, workflow, &steps).await?;

        if let Err(e) = self.validate_all(task, &steps).await {
            return self.fail(task, format!("validation failed: {e}")).await;
        }

        let view = task.view();
        match task.driver.deploy.prepare(&view, workflow).await {
            Ok(PrepareOutcome::Ready) => {}
            Ok(PrepareOutcome::Wait) => {
                self.persist_wait(task, key, true).await?;
                return task.apply_event(ProvisionEvent::Wait).await;
            }
            Err(e) => return self.fail_with_teardown(task, workflow, e).await,
        }

        self.run_steps(task, workflow, key, &steps, 0).await
    }

    /// Resume a workflow from its `<W>WAIT` state (spec §4.4
    /// `continue_node_<W>`). `skip_current_step` overrides the stored
    /// default (normally `true`; the oob-reboot special case stores
    /// `false` so the interrupted step retries) — pass `None` to use
    /// whatever the executor last recorded.
    pub async fn resume<C: Clock>(
        &self,
        task: &mut Task<C>,
        workflow: Workflow,
        skip_current_step: Option<bool>,
    ) -> Result<(), ConductorError> {
        let key = workflow_key(workflow)?;
        let expected = wait_state(workflow)?;
        let current = task.current_state();
        if current != expected {
            return Err(ClientError::InvalidStateRequested(format!(
                "cannot resume {workflow:?}: node is in {current}, not {expected}"
            ))
            .into());
        }

        let steps = load_steps(&task.node, key)?;
        let index = load_index(&task.node, key)?;
        let effective_skip = skip_current_step.unwrap_or_else(|| load_skip_default(&task.node, key));

        task.apply_event(ProvisionEvent::Resume).await?;

        if take_abort_after(&task.node, key) {
            let aborted = steps.get(index).map(|s| s.step.as_str());
            return self.abort_now(task, key, aborted).await;
        }

        let next_index = if effective_skip { index + 1 } else { index };
        self.run_steps(task, workflow, key, &steps, next_index).await
    }

    /// Abort the in-progress clean workflow (spec §4.4 Abort). Only the
    /// clean workflow declares an `abort` transition; requesting abort on
    /// any other workflow is a client error.
    pub async fn abort<C: Clock>(&self, task: &mut Task<C>, workflow: Workflow) -> Result<(), ConductorError> {
        if workflow != Workflow::Clean {
            return Err(ClientError::InvalidStateRequested(
                "abort is only supported for the clean workflow".to_string(),
            )
            .into());
        }
        let key = workflow_key(workflow)?;
        let current = step_field(&task.node, workflow)
            .ok_or_else(|| ClientError::InvalidStateRequested("no active clean step to abort".to_string()))?;

        if current.abortable {
            return self.abort_now(task, key, Some(&current.step)).await;
        }

        let abort_key = format!("{key}_abort_after");
        task.mutate(move |n| {
            n.driver_internal_info.insert(abort_key, serde_json::Value::Bool(true));
        })
        .await
    }

    /// Store a caller-supplied configdrive ahead of a deploy (spec §4.4
    /// "Deploy-specific wrappers"): inline if under the configured
    /// threshold, otherwise uploaded to the object store with a TTL
    /// matching the deploy callback timeout.
    pub async fn store_configdrive<C: Clock>(
        &self,
        task: &mut Task<C>,
        configdrive: ConfigDrive,
    ) -> Result<(), ConductorError> {
        let rendered = match configdrive {
            ConfigDrive::Literal(s) => s,
            ConfigDrive::Structured { user_data, meta_data, network_data, vendor_data } => {
                self.configdrive_builder
                    .build(user_data.as_ref(), meta_data.as_ref(), network_data.as_ref(), vendor_data.as_ref())
                    .await?
            }
        };

        let value = if rendered.len() <= self.inline_max_bytes {
            rendered
        } else {
            let name = task.node.id.to_string();
            self.object_store
                .create_object(
                    &self.object_store_container,
                    &name,
                    rendered.into_bytes(),
                    Some(self.deploy_callback_timeout_ms),
                )
                .await?;
            self.object_store
                .get_temp_url(&self.object_store_container, &name, self.deploy_callback_timeout_ms)
                .await?
        };

        task.mutate(move |n| {
            n.instance_info.insert("configdrive".to_string(), serde_json::Value::String(value));
        })
        .await
    }

    async fn run_steps<C: Clock>(
        &self,
        task: &mut Task<C>,
        workflow: Workflow,
        key: &str,
        steps: &[StepDescriptor],
        mut index: usize,
    ) -> Result<(), ConductorError> {
        while index < steps.len() {
            let step = steps[index].clone();
            self.persist_current_step(task, key, workflow, &step, index).await?;

            match self.dispatch(task, &step).await {
                Ok(StepOutcome::Done) => {
                    if take_abort_after(&task.node, key) {
                        return self.abort_now(task, key, Some(&step.step)).await;
                    }
                    index += 1;
                }
                Ok(StepOutcome::Wait) => {
                    self.persist_wait(task, key, true).await?;
                    return task.apply_event(ProvisionEvent::Wait).await;
                }
                Err(DriverError::InstanceDeployFailure(ref msg))
                    if step.deployment_reboot && msg.contains("agent lost connection") =>
                {
                    self.persist_wait(task, key, false).await?;
                    return task.apply_event(ProvisionEvent::Wait).await;
                }
                Err(e) => return self.fail_with_teardown(task, workflow, e).await,
            }
        }
        self.finish(task, key, workflow).await
    }

    async fn dispatch<C: Clock>(&self, task: &Task<C>, step: &StepDescriptor) -> Result<StepOutcome, DriverError> {
        let view = task.view();
        match step.interface.as_str() {
            "power" => task.driver.power.execute_step(&view, step).await,
            "management" => task.driver.management.execute_step(&view, step).await,
            "deploy" => task.driver.deploy.execute_step(&view, step).await,
            "raid" => task.driver.require_raid()?.execute_step(&view, step).await,
            "bios" => task.driver.require_bios()?.execute_step(&view, step).await,
            other => Err(DriverError::ContractViolation(format!("unknown step interface: {other}"))),
        }
    }

    async fn validate_interface<C: Clock>(&self, task: &Task<C>, interface: &str) -> Result<(), DriverError> {
        let view = task.view();
        match interface {
            "power" => task.driver.power.validate(&view).await,
            "management" => task.driver.management.validate(&view).await,
            "deploy" => task.driver.deploy.validate(&view).await,
            "raid" => task.driver.require_raid()?.validate(&view).await,
            "bios" => task.driver.require_bios()?.validate(&view).await,
            other => Err(DriverError::ContractViolation(format!("unknown step interface: {other}"))),
        }
    }

    async fn validate_all<C: Clock>(&self, task: &Task<C>, steps: &[StepDescriptor]) -> Result<(), DriverError> {
        let view = task.view();
        task.driver.power.validate(&view).await?;
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert("power");
        for step in steps {
            if seen.insert(step.interface.as_str()) {
                self.validate_interface(task, &step.interface).await?;
            }
        }
        Ok(())
    }

    async fn persist_steps<C: Clock>(
        &self,
        task: &mut Task<C>,
        key: &str,
        workflow: Workflow,
        steps: &[StepDescriptor],
    ) -> Result<(), ConductorError> {
        let steps_json = serde_json::to_value(steps)
            .map_err(|e| ConductorError::Internal(format!("failed to serialize {key}_steps: {e}")))?;
        let first = steps.first().cloned();
        let steps_key = format!("{key}_steps");
        let index_key = format!("{key}_step_index");
        task.mutate(move |n| {
            n.driver_internal_info.insert(steps_key, steps_json);
            n.driver_internal_info.insert(index_key, serde_json::Value::from(0u64));
            set_step_field(n, workflow, first);
        })
        .await
    }

    async fn persist_current_step<C: Clock>(
        &self,
        task: &mut Task<C>,
        key: &str,
        workflow: Workflow,
        step: &StepDescriptor,
        index: usize,
    ) -> Result<(), ConductorError> {
        let index_key = format!("{key}_step_index");
        let step = step.clone();
        task.mutate(move |n| {
            n.driver_internal_info.insert(index_key, serde_json::Value::from(index as u64));
            set_step_field(n, workflow, Some(step));
        })
        .await
    }

    async fn persist_wait<C: Clock>(
        &self,
        task: &mut Task<C>,
        key: &str,
        skip_default: bool,
    ) -> Result<(), ConductorError> {
        let skip_key = format!("{key}_skip_step_default");
        task.mutate(move |n| {
            n.driver_internal_info.insert(skip_key, serde_json::Value::Bool(skip_default));
        })
        .await
    }

    async fn clear_abort_after<C: Clock>(&self, task: &mut Task<C>, key: &str) -> Result<(), ConductorError> {
        let abort_key = format!("{key}_abort_after");
        task.mutate(move |n| {
            n.driver_internal_info.remove(&abort_key);
        })
        .await
    }

    async fn finish<C: Clock>(&self, task: &mut Task<C>, key: &str, workflow: Workflow) -> Result<(), ConductorError> {
        let steps_key = format!("{key}_steps");
        let index_key = format!("{key}_step_index");
        let skip_key = format!("{key}_skip_step_default");
        let abort_key = format!("{key}_abort_after");
        task.mutate(move |n| {
            n.driver_internal_info.remove(&steps_key);
            n.driver_internal_info.remove(&index_key);
            n.driver_internal_info.remove(&skip_key);
            n.driver_internal_info.remove(&abort_key);
            set_step_field(n, workflow, None);
        })
        .await?;
        task.apply_event(ProvisionEvent::Done).await
    }

    async fn fail<C: Clock>(&self, task: &mut Task<C>, message: String) -> Result<(), ConductorError> {
        task.mutate(move |n| {
            n.last_error = Some(message);
        })
        .await?;
        task.apply_event(ProvisionEvent::Fail).await
    }

    /// On a driver contract violation the node is also placed into
    /// maintenance; likewise if the defensive tear-down call itself fails
    /// (spec §4.4 steps 4-5).
    async fn fail_with_teardown<C: Clock>(
        &self,
        task: &mut Task<C>,
        workflow: Workflow,
        err: DriverError,
    ) -> Result<(), ConductorError> {
        if matches!(err, DriverError::ContractViolation(_)) {
            task.mutate(|n| n.maintenance = true).await?;
        }
        let view = task.view();
        if let Err(teardown_err) = task.driver.deploy.tear_down(&view, workflow).await {
            tracing::warn!(error = %teardown_err, "tear_down hook failed while handling a workflow failure");
            task.mutate(|n| n.maintenance = true).await?;
        }
        self.fail(task, err.to_string()).await
    }

    async fn abort_now<C: Clock>(
        &self,
        task: &mut Task<C>,
        key: &str,
        step_name: Option<&str>,
    ) -> Result<(), ConductorError> {
        self.clear_abort_after(task, key).await?;
        let message = match step_name {
            Some(name) => format!("aborted during step '{name}'"),
            None => "aborted".to_string(),
        };
        task.mutate(move |n| {
            n.last_error = Some(message);
        })
        .await?;
        task.apply_event(ProvisionEvent::Abort).await
    }
}

fn workflow_key(workflow: Workflow) -> Result<&'static str, ConductorError> {
    match workflow {
        Workflow::Deploy => Ok("deploy"),
        Workflow::Clean => Ok("clean"),
        Workflow::Service => Ok("service"),
        Workflow::Rescue | Workflow::Inspect => {
            Err(ConductorError::Internal(format!("the step executor does not drive the {workflow:?} workflow")))
        }
    }
}

fn wait_state(workflow: Workflow) -> Result<ProvisionState, ConductorError> {
    match workflow {
        Workflow::Deploy => Ok(ProvisionState::DeployWait),
        Workflow::Clean => Ok(ProvisionState::CleanWait),
        Workflow::Service => Ok(ProvisionState::ServiceWait),
        Workflow::Rescue | Workflow::Inspect => {
            Err(ConductorError::Internal(format!("the step executor does not drive the {workflow:?} workflow")))
        }
    }
}

fn step_field(node: &Node, workflow: Workflow) -> Option<StepDescriptor> {
    match workflow {
        Workflow::Deploy => node.deploy_step.clone(),
        Workflow::Clean => node.clean_step.clone(),
        Workflow::Service => node.service_step.clone(),
        Workflow::Rescue | Workflow::Inspect => None,
    }
}

fn set_step_field(node: &mut Node, workflow: Workflow, step: Option<StepDescriptor>) {
    match workflow {
        Workflow::Deploy => node.deploy_step = step,
        Workflow::Clean => node.clean_step = step,
        Workflow::Service => node.service_step = step,
        Workflow::Rescue | Workflow::Inspect => {}
    }
}

fn load_steps(node: &Node, key: &str) -> Result<Vec<StepDescriptor>, ConductorError> {
    let value = node
        .driver_internal_info
        .get(&format!("{key}_steps"))
        .ok_or_else(|| ConductorError::Internal(format!("node is missing {key}_steps")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| ConductorError::Internal(format!("malformed {key}_steps: {e}")))
}

fn load_index(node: &Node, key: &str) -> Result<usize, ConductorError> {
    node.driver_internal_info
        .get(&format!("{key}_step_index"))
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| ConductorError::Internal(format!("node is missing {key}_step_index")))
}

fn load_skip_default(node: &Node, key: &str) -> bool {
    node.driver_internal_info
        .get(&format!("{key}_skip_step_default"))
        .and_then(|v| v.as_bool())
        .unwrap_or(true)
}

fn take_abort_after(node: &Node, key: &str) -> bool {
    node.driver_internal_info.get(&format!("{key}_abort_after")).and_then(|v| v.as_bool()).unwrap_or(false)
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
