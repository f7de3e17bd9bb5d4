// SPDX-License-Identifier: MIT

//! The six seeded scenarios, exercised end-to-end through the public API
//! surface (`ConductorService`/`ConductorApi`/the periodic sweepers) rather
//! than through any one crate's internals. Each scenario also has a focused
//! unit test closer to the code it exercises (see `conductor-executor`'s
//! `deploy_prepare_failure_leaves_target_state_intact`,
//! `async_clean_with_abort_on_abortable_step_fails_immediately`,
//! `conductor-service`'s `timeouts_tests` and `power_sync_tests`, and
//! `orphan_tests`); this suite is the top-level composition check that all
//! of those pieces actually agree once wired together into one conductor.

use std::sync::Arc;

use async_trait::async_trait;
use conductor_core::error::DriverError;
use conductor_core::test_support::{ConductorBuilder, NodeBuilder};
use conductor_core::{FakeClock, Settings, StepDescriptor};
use conductor_driver::{
    fake_driver, DeployInterface, Driver, DriverRegistry, Interface, PrepareOutcome, StepOutcome,
    TaskView,
};
use conductor_fsm::{ProvisionEvent, ProvisionState, Workflow};
use conductor_service::{ConductorApi, ConductorService};
use conductor_store::memory::InMemoryNodeStore;
use conductor_store::{NodeIdentity, NodeStore};
use parking_lot::Mutex;

fn registry_with(driver: Arc<Driver>) -> Arc<DriverRegistry> {
    let registry = Arc::new(DriverRegistry::new());
    registry.register(driver).expect("test driver advertises steps for every workflow it is used in");
    registry
}

async fn started(settings: Settings, store: Arc<dyn NodeStore>, registry: Arc<DriverRegistry>) -> ConductorService<FakeClock> {
    ConductorService::start(settings, store, registry, FakeClock::new()).await.expect("conductor starts")
}

async fn poll_until(store: &dyn NodeStore, id: conductor_core::NodeId, pred: impl Fn(&conductor_core::Node) -> bool) -> conductor_core::Node {
    for _ in 0..500 {
        let node = store.get_node_by_identity(&NodeIdentity::from(id)).await.unwrap();
        if pred(&node) {
            return node;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true for node {id}");
}

#[tokio::test]
async fn scenario_happy_deploy_reaches_active() {
    let store: Arc<dyn NodeStore> = Arc::new(InMemoryNodeStore::new());
    let mut settings = Settings::default();
    settings.hostname = "conductor-a".to_string();
    let service = started(settings, store.clone(), registry_with(fake_driver("fake-hardware"))).await;
    let api = ConductorApi::new(service.ctx.clone());

    let node = NodeBuilder::default().provision_state(ProvisionState::Available).build();
    store.create_node(node.clone()).await.unwrap();

    api.do_node_deploy(node.id, false, None).await.unwrap();
    poll_until(store.as_ref(), node.id, |n| n.provision_state == ProvisionState::DeployWait).await;
    api.continue_node_deploy(node.id, None).await.unwrap();

    let active = poll_until(store.as_ref(), node.id, |n| n.provision_state == ProvisionState::Active).await;
    assert!(active.last_error.is_none());
    assert!(active.deploy_step.is_none());
    assert_eq!(active.conductor_affinity, Some(service.ctx.host.clone()));

    service.shutdown().await;
}

/// A deploy driver whose `prepare` call always fails, so the node never gets
/// past the first step.
struct FailingPrepareDeploy {
    steps: Vec<StepDescriptor>,
}

#[async_trait]
impl Interface for FailingPrepareDeploy {
    async fn validate(&self, _task: &TaskView) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl DeployInterface for FailingPrepareDeploy {
    fn advertise_steps(&self, workflow: Workflow) -> Vec<StepDescriptor> {
        match workflow {
            Workflow::Deploy => self.steps.clone(),
            _ => Vec::new(),
        }
    }

    async fn prepare(&self, _task: &TaskView, _workflow: Workflow) -> Result<PrepareOutcome, DriverError> {
        Err(DriverError::InstanceDeployFailure("no power budget for this node".to_string()))
    }

    async fn tear_down(&self, _task: &TaskView, _workflow: Workflow) -> Result<(), DriverError> {
        Ok(())
    }

    async fn execute_step(&self, _task: &TaskView, _step: &StepDescriptor) -> Result<StepOutcome, DriverError> {
        Err(DriverError::ContractViolation("prepare should have short-circuited this deploy".to_string()))
    }
}

fn driver_with_failing_prepare() -> Arc<Driver> {
    let base = fake_driver("flaky-hardware");
    Arc::new(Driver {
        name: "flaky-hardware".to_string(),
        power: base.power.clone(),
        management: base.management.clone(),
        boot: base.boot.clone(),
        deploy: Arc::new(FailingPrepareDeploy { steps: vec![StepDescriptor::new("deploy", "write_image", 80)] }),
        console: base.console.clone(),
        vendor: None,
        raid: base.raid.clone(),
        bios: base.bios.clone(),
        inspect: base.inspect.clone(),
    })
}

#[tokio::test]
async fn scenario_deploy_failure_leaves_target_state_intact() {
    let store: Arc<dyn NodeStore> = Arc::new(InMemoryNodeStore::new());
    let mut settings = Settings::default();
    settings.hostname = "conductor-a".to_string();
    settings.hardware_types = vec!["flaky-hardware".to_string()];
    let service = started(settings, store.clone(), registry_with(driver_with_failing_prepare())).await;
    let api = ConductorApi::new(service.ctx.clone());

    let node = NodeBuilder::default().driver("flaky-hardware").provision_state(ProvisionState::Available).build();
    store.create_node(node.clone()).await.unwrap();

    api.do_node_deploy(node.id, false, None).await.unwrap();

    let failed = poll_until(store.as_ref(), node.id, |n| n.provision_state == ProvisionState::DeployFail).await;
    assert!(failed.last_error.as_deref().unwrap().contains("no power budget"));
    assert_eq!(failed.target_provision_state, Some(ProvisionState::Active));

    service.shutdown().await;
}

/// A clean driver whose abortable step waits on the first call, so the
/// workflow parks in `CleanWait` for a caller to abort instead of racing
/// straight to completion.
#[derive(Default)]
struct WaitsOnceAbortableDeploy {
    called: Mutex<u32>,
}

#[async_trait]
impl Interface for WaitsOnceAbortableDeploy {
    async fn validate(&self, _task: &TaskView) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl DeployInterface for WaitsOnceAbortableDeploy {
    fn advertise_steps(&self, workflow: Workflow) -> Vec<StepDescriptor> {
        match workflow {
            Workflow::Deploy => vec![StepDescriptor::new("deploy", "write_image", 80)],
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

    async fn execute_step(&self, _task: &TaskView, _step: &StepDescriptor) -> Result<StepOutcome, DriverError> {
        let mut called = self.called.lock();
        *called += 1;
        if *called == 1 {
            Ok(StepOutcome::Wait)
        } else {
            Ok(StepOutcome::Done)
        }
    }
}

fn driver_with_abortable_wait() -> Arc<Driver> {
    let base = fake_driver("abortable-hardware");
    Arc::new(Driver {
        name: "abortable-hardware".to_string(),
        power: base.power.clone(),
        management: base.management.clone(),
        boot: base.boot.clone(),
        deploy: Arc::new(WaitsOnceAbortableDeploy::default()),
        console: base.console.clone(),
        vendor: None,
        raid: base.raid.clone(),
        bios: base.bios.clone(),
        inspect: base.inspect.clone(),
    })
}

#[tokio::test]
async fn scenario_async_clean_aborts_mid_step_without_running_it_to_completion() {
    let store: Arc<dyn NodeStore> = Arc::new(InMemoryNodeStore::new());
    let mut settings = Settings::default();
    settings.hostname = "conductor-a".to_string();
    settings.hardware_types = vec!["abortable-hardware".to_string()];
    let service = started(settings, store.clone(), registry_with(driver_with_abortable_wait())).await;
    let api = ConductorApi::new(service.ctx.clone());

    let node = NodeBuilder::default().driver("abortable-hardware").provision_state(ProvisionState::Manageable).build();
    store.create_node(node.clone()).await.unwrap();

    api.do_node_clean(node.id, None).await.unwrap();
    poll_until(store.as_ref(), node.id, |n| n.provision_state == ProvisionState::CleanWait).await;

    api.do_provisioning_action(node.id, ProvisionEvent::Abort).await.unwrap();

    let aborted = poll_until(store.as_ref(), node.id, |n| n.provision_state == ProvisionState::CleanFail).await;
    assert!(aborted.last_error.as_deref().unwrap().contains("aborted during step"));

    service.shutdown().await;
}

#[tokio::test]
async fn scenario_clean_timeout_fails_a_stuck_node_and_clears_step_bookkeeping() {
    let store: Arc<dyn NodeStore> = Arc::new(InMemoryNodeStore::new());
    let mut settings = Settings::default();
    settings.hostname = "conductor-a".to_string();
    let service = started(settings, store.clone(), registry_with(fake_driver("fake-hardware"))).await;
    let timeout_ms = service.ctx.settings.callback_timeouts.clean_callback_timeout_ms;
    service.ctx.clock.set_epoch_ms(timeout_ms + 1);

    let mut node = NodeBuilder::default().provision_state(ProvisionState::CleanWait).provision_updated_at(0).build();
    node.driver_internal_info.insert("clean_steps".to_string(), serde_json::json!([]));
    node.driver_internal_info.insert("clean_step_index".to_string(), serde_json::json!(0));
    store.create_node(node.clone()).await.unwrap();

    conductor_service::periodic::timeouts::run_clean_timeout(service.ctx.as_ref()).await.unwrap();

    let stored = store.get_node_by_identity(&NodeIdentity::from(node.id)).await.unwrap();
    assert_eq!(stored.provision_state, ProvisionState::CleanFail);
    assert!(stored.last_error.as_deref().unwrap().contains("timed out"));
    assert!(!stored.driver_internal_info.contains_key("clean_steps"));

    service.shutdown().await;
}

/// A power driver that always reports a state different from whatever the
/// last commanded target was, so sync never converges and the retry budget
/// always gets exhausted.
#[derive(Default)]
struct NeverConvergesPower;

#[async_trait]
impl Interface for NeverConvergesPower {
    async fn validate(&self, _task: &TaskView) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl conductor_driver::PowerInterface for NeverConvergesPower {
    async fn execute_step(&self, _task: &TaskView, _step: &StepDescriptor) -> Result<StepOutcome, DriverError> {
        Ok(StepOutcome::Done)
    }

    async fn get_power_state(&self, _task: &TaskView) -> Result<conductor_core::PowerState, DriverError> {
        Ok(conductor_core::PowerState::PowerOff)
    }

    async fn set_power_state(&self, _task: &TaskView, _target: conductor_core::PowerState) -> Result<(), DriverError> {
        Ok(())
    }
}

fn driver_that_never_converges() -> Arc<Driver> {
    let base = fake_driver("stuck-hardware");
    Arc::new(Driver {
        name: "stuck-hardware".to_string(),
        power: Arc::new(NeverConvergesPower),
        management: base.management.clone(),
        boot: base.boot.clone(),
        deploy: base.deploy.clone(),
        console: base.console.clone(),
        vendor: None,
        raid: base.raid.clone(),
        bios: base.bios.clone(),
        inspect: base.inspect.clone(),
    })
}

#[tokio::test]
async fn scenario_power_sync_places_a_node_in_maintenance_after_retries_are_exhausted() {
    let store: Arc<dyn NodeStore> = Arc::new(InMemoryNodeStore::new());
    let mut settings = Settings::default();
    settings.hostname = "conductor-a".to_string();
    settings.power_sync.force_power_state_during_sync = true;
    settings.power_sync.power_state_sync_max_retries = 2;
    let service = started(settings, store.clone(), registry_with(driver_that_never_converges())).await;

    let node = NodeBuilder::default()
        .driver("stuck-hardware")
        .provision_state(ProvisionState::Available)
        .power_state(conductor_core::PowerState::PowerOn)
        .build();
    store.create_node(node.clone()).await.unwrap();

    for _ in 0..4 {
        conductor_service::periodic::power_sync::run_once(service.ctx.as_ref()).await.unwrap();
    }

    let stored = store.get_node_by_identity(&NodeIdentity::from(node.id)).await.unwrap();
    assert!(stored.maintenance);
    assert_eq!(stored.power_state, conductor_core::PowerState::PowerOff);
    assert!(stored.maintenance_reason.is_some());

    service.shutdown().await;
}

#[tokio::test]
async fn scenario_orphan_recovery_releases_a_dead_conductors_reservation() {
    let store: Arc<dyn NodeStore> = Arc::new(InMemoryNodeStore::new());

    let mut settings_b = Settings::default();
    settings_b.hostname = "conductor-b".to_string();
    let service_b = started(settings_b, store.clone(), registry_with(fake_driver("fake-hardware"))).await;

    // conductor-a is stale: its Conductor row was last stamped long before
    // conductor-b's offline threshold.
    store
        .upsert_conductor(ConductorBuilder::default().id("conductor-a").updated_at_ms(0).build())
        .await
        .unwrap();
    let node = NodeBuilder::default()
        .reservation("conductor-a")
        .provision_state(ProvisionState::Deploying)
        .build();
    store.create_node(node.clone()).await.unwrap();

    let threshold = service_b.ctx.settings.periodic.conductor_offline_threshold_ms;
    service_b.ctx.clock.set_epoch_ms(threshold + 1000);

    conductor_service::periodic::orphan::run_once(service_b.ctx.as_ref()).await.unwrap();

    let stored = store.get_node_by_identity(&NodeIdentity::from(node.id)).await.unwrap();
    assert!(stored.reservation.is_none());
    assert_eq!(stored.provision_state, ProvisionState::DeployFail);
    assert!(stored.last_error.as_deref().unwrap().contains("conductor-a"));

    service_b.shutdown().await;
}
