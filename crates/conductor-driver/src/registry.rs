// SPDX-License-Identifier: MIT

//! The static interface bundle and the registry that hands bundles out by
//! hardware-type name (spec §4.6, §9 redesign note: "dynamic plugin discovery
//! -> static interface bundle behind a registry lookup").

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use conductor_core::error::DriverError;
use conductor_core::StepDescriptor;
use conductor_fsm::Workflow;
use parking_lot::RwLock;

use crate::interface::{
    BiosInterface, BootInterface, ConsoleInterface, DeployInterface, InspectInterface,
    ManagementInterface, PowerInterface, RaidInterface, VendorInterface,
};

/// One hardware type's full capability bundle. `power`, `management`,
/// `boot` and `deploy` are mandatory (spec §4.6 "fixed interface slots");
/// everything else is optional and surfaces
/// `DriverError` via [`Driver::require_*`] when invoked while absent.
pub struct Driver {
    pub name: String,
    pub power: Arc<dyn PowerInterface>,
    pub management: Arc<dyn ManagementInterface>,
    pub boot: Arc<dyn BootInterface>,
    pub deploy: Arc<dyn DeployInterface>,
    pub console: Option<Arc<dyn ConsoleInterface>>,
    pub vendor: Option<Arc<dyn VendorInterface>>,
    pub raid: Option<Arc<dyn RaidInterface>>,
    pub bios: Option<Arc<dyn BiosInterface>>,
    pub inspect: Option<Arc<dyn InspectInterface>>,
}

impl Driver {
    pub fn require_console(&self) -> Result<&Arc<dyn ConsoleInterface>, DriverError> {
        self.console
            .as_ref()
            .ok_or_else(|| DriverError::DriverNotFound(format!("{}: no console interface", self.name)))
    }

    pub fn require_vendor(&self) -> Result<&Arc<dyn VendorInterface>, DriverError> {
        self.vendor
            .as_ref()
            .ok_or_else(|| DriverError::DriverNotFound(format!("{}: no vendor interface", self.name)))
    }

    pub fn require_raid(&self) -> Result<&Arc<dyn RaidInterface>, DriverError> {
        self.raid
            .as_ref()
            .ok_or_else(|| DriverError::DriverNotFound(format!("{}: no raid interface", self.name)))
    }

    pub fn require_bios(&self) -> Result<&Arc<dyn BiosInterface>, DriverError> {
        self.bios
            .as_ref()
            .ok_or_else(|| DriverError::DriverNotFound(format!("{}: no bios interface", self.name)))
    }

    pub fn require_inspect(&self) -> Result<&Arc<dyn InspectInterface>, DriverError> {
        self.inspect
            .as_ref()
            .ok_or_else(|| DriverError::DriverNotFound(format!("{}: no inspect interface", self.name)))
    }

    /// Every step this bundle contributes to `workflow`, collected across
    /// whichever interfaces are present and sorted by descending priority —
    /// ties broken by interface-then-step name so ordering is stable across
    /// runs (spec §4.4 "steps run in descending-priority order").
    fn collect_steps(&self, workflow: Workflow) -> Vec<StepDescriptor> {
        let mut steps = Vec::new();
        steps.extend(self.power.advertise_steps(workflow));
        steps.extend(self.management.advertise_steps(workflow));
        steps.extend(self.deploy.advertise_steps(workflow));
        if let Some(raid) = &self.raid {
            steps.extend(raid.advertise_steps(workflow));
        }
        if let Some(bios) = &self.bios {
            steps.extend(bios.advertise_steps(workflow));
        }
        steps.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.interface.cmp(&b.interface))
                .then_with(|| a.step.cmp(&b.step))
        });
        steps
    }
}

/// Per-hardware-type step lists, computed once at registration and reused
/// for every task (spec §9: "declarative step descriptors... enumerated
/// once at registration and cached per hardware type").
#[derive(Default)]
struct StepCache {
    by_workflow: HashMap<(String, Workflow), Vec<StepDescriptor>>,
}

/// Maps hardware-type names to their [`Driver`] bundle.
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<Driver>>>,
    steps: RwLock<StepCache>,
    /// Hardware types already warned about a non-fatal step-list gap, so the
    /// warning fires at most once per process (spec §9: the
    /// `_SEEN_NO_DEPLOY_STEP_DEPRECATIONS`-style dedup set, generalized to
    /// any "driver registered with a surprising empty step list" warning).
    warned: RwLock<HashSet<String>>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
            steps: RwLock::new(StepCache::default()),
            warned: RwLock::new(HashSet::new()),
        }
    }

    /// Registers `driver`, pre-computing and caching its step lists for
    /// every workflow that carries steps.
    ///
    /// Fails with `DriverError::ContractViolation` if the driver contributes
    /// no deploy steps at all — the pre-steps "old deploy" path is not
    /// supported (spec §9 Open Question, resolved: step-based only). A
    /// driver contributing no clean steps is not rejected (cleaning is
    /// optional for some hardware types) but is warned about once per
    /// process per hardware type.
    pub fn register(&self, driver: Arc<Driver>) -> Result<(), DriverError> {
        let deploy_steps = driver.collect_steps(Workflow::Deploy);
        if deploy_steps.is_empty() {
            return Err(DriverError::ContractViolation(format!(
                "{}: driver advertises no deploy steps; the pre-steps deploy path is not supported",
                driver.name
            )));
        }

        let clean_steps = driver.collect_steps(Workflow::Clean);
        if clean_steps.is_empty() && self.warned.write().insert(driver.name.clone()) {
            tracing::warn!(hardware_type = %driver.name, "driver advertises no clean steps");
        }

        let mut cache = self.steps.write();
        cache.by_workflow.insert((driver.name.clone(), Workflow::Deploy), deploy_steps);
        cache.by_workflow.insert((driver.name.clone(), Workflow::Clean), clean_steps);
        cache
            .by_workflow
            .insert((driver.name.clone(), Workflow::Service), driver.collect_steps(Workflow::Service));
        drop(cache);
        self.drivers.write().insert(driver.name.clone(), driver);
        Ok(())
    }

    pub fn get(&self, hardware_type: &str) -> Result<Arc<Driver>, DriverError> {
        self.drivers
            .read()
            .get(hardware_type)
            .cloned()
            .ok_or_else(|| DriverError::DriverNotFound(hardware_type.to_string()))
    }

    pub fn hardware_types(&self) -> Vec<String> {
        self.drivers.read().keys().cloned().collect()
    }

    /// The cached step list for `hardware_type`'s `workflow`. Empty (not an
    /// error) if the hardware type is registered but contributes no steps to
    /// this workflow; `DriverError::DriverNotFound` if it isn't registered
    /// at all.
    pub fn steps_for(&self, hardware_type: &str, workflow: Workflow) -> Result<Vec<StepDescriptor>, DriverError> {
        if !self.drivers.read().contains_key(hardware_type) {
            return Err(DriverError::DriverNotFound(hardware_type.to_string()));
        }
        Ok(self
            .steps
            .read()
            .by_workflow
            .get(&(hardware_type.to_string(), workflow))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
