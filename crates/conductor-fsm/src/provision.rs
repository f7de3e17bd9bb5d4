// SPDX-License-Identifier: MIT

//! The concrete provisioning state machine every [`crate::fsm::Fsm`] instance
//! in the conductor is built from.

use crate::fsm::{Fsm, StateSpec};

/// Every `provision_state` a node can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ProvisionState {
    // stable
    Enroll,
    Manageable,
    Available,
    Active,
    Error,
    Rescue,
    // verify
    Verifying,
    // inspect
    Inspecting,
    InspectWait,
    InspectFail,
    // deploy
    Deploying,
    DeployWait,
    DeployFail,
    DeployHold,
    // clean
    Cleaning,
    CleanWait,
    CleanFail,
    CleanHold,
    // delete
    Deleting,
    // rescue
    Rescuing,
    RescueWait,
    RescueFail,
    Unrescuing,
    UnrescueFail,
    // adopt
    Adopting,
    AdoptFail,
    // service
    Servicing,
    ServiceWait,
    ServiceFail,
    ServiceHold,
}

impl std::fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ProvisionState::Enroll => "enroll",
            ProvisionState::Manageable => "manageable",
            ProvisionState::Available => "available",
            ProvisionState::Active => "active",
            ProvisionState::Error => "error",
            ProvisionState::Rescue => "rescue",
            ProvisionState::Verifying => "verifying",
            ProvisionState::Inspecting => "inspecting",
            ProvisionState::InspectWait => "inspect wait",
            ProvisionState::InspectFail => "inspect failed",
            ProvisionState::Deploying => "deploying",
            ProvisionState::DeployWait => "wait call-back",
            ProvisionState::DeployFail => "deploy failed",
            ProvisionState::DeployHold => "deploy hold",
            ProvisionState::Cleaning => "cleaning",
            ProvisionState::CleanWait => "clean wait",
            ProvisionState::CleanFail => "clean failed",
            ProvisionState::CleanHold => "clean hold",
            ProvisionState::Deleting => "deleting",
            ProvisionState::Rescuing => "rescuing",
            ProvisionState::RescueWait => "rescue wait",
            ProvisionState::RescueFail => "rescue failed",
            ProvisionState::Unrescuing => "unrescuing",
            ProvisionState::UnrescueFail => "unrescue failed",
            ProvisionState::Adopting => "adopting",
            ProvisionState::AdoptFail => "adopt failed",
            ProvisionState::Servicing => "servicing",
            ProvisionState::ServiceWait => "service wait",
            ProvisionState::ServiceFail => "service failed",
            ProvisionState::ServiceHold => "service hold",
        })
    }
}

/// Every event the provisioning FSM accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ProvisionEvent {
    Manage,
    Done,
    Fail,
    Deploy,
    Wait,
    Resume,
    Rebuild,
    Delete,
    Clean,
    Provide,
    Abort,
    Unhold,
    Inspect,
    Adopt,
    Rescue,
    Unrescue,
    Service,
}

/// Build the provisioning FSM with every state and transition named in the
/// node-lifecycle specification. Returned uninitialised — callers call
/// `initialize` with the node's persisted `provision_state`.
///
/// The `expect`s below assert this fixed, hand-written table is internally
/// consistent (no duplicate states, no transition naming an undeclared
/// state) — a failure here is a bug in this function, not a runtime
/// condition callers can hit.
#[allow(clippy::expect_used)]
pub fn build_provision_fsm() -> Fsm<ProvisionState, ProvisionEvent> {
    use ProvisionState::*;
    let mut fsm = Fsm::new();

    let stable = |fsm: &mut Fsm<ProvisionState, ProvisionEvent>, s: ProvisionState| {
        fsm.add_state(s, StateSpec { stable: true, terminal: false, target: None }).expect("stable state");
    };
    stable(&mut fsm, Enroll);
    stable(&mut fsm, Manageable);
    stable(&mut fsm, Available);
    stable(&mut fsm, Active);
    stable(&mut fsm, Error);
    stable(&mut fsm, Rescue);

    let transient = |fsm: &mut Fsm<ProvisionState, ProvisionEvent>, s: ProvisionState, target: ProvisionState| {
        fsm.add_state(s, StateSpec { stable: false, terminal: false, target: Some(target) })
            .expect("transient state");
    };
    transient(&mut fsm, Verifying, Manageable);
    transient(&mut fsm, Inspecting, Manageable);
    transient(&mut fsm, InspectWait, Manageable);
    transient(&mut fsm, InspectFail, Manageable);
    transient(&mut fsm, Deploying, Active);
    transient(&mut fsm, DeployWait, Active);
    transient(&mut fsm, DeployFail, Active);
    transient(&mut fsm, DeployHold, Active);
    transient(&mut fsm, Cleaning, Available);
    transient(&mut fsm, CleanWait, Available);
    transient(&mut fsm, CleanFail, Available);
    transient(&mut fsm, CleanHold, Available);
    transient(&mut fsm, Deleting, Available);
    transient(&mut fsm, Rescuing, Rescue);
    transient(&mut fsm, RescueWait, Rescue);
    transient(&mut fsm, RescueFail, Rescue);
    transient(&mut fsm, Unrescuing, Active);
    transient(&mut fsm, UnrescueFail, Active);
    transient(&mut fsm, Adopting, Active);
    transient(&mut fsm, AdoptFail, Active);
    transient(&mut fsm, Servicing, Active);
    transient(&mut fsm, ServiceWait, Active);
    transient(&mut fsm, ServiceFail, Active);
    transient(&mut fsm, ServiceHold, Active);

    let t = |fsm: &mut Fsm<ProvisionState, ProvisionEvent>,
             start: ProvisionState,
             event: ProvisionEvent,
             end: ProvisionState| {
        fsm.add_transition(start, event, end).expect("declared transition");
    };

    // `ProvisionEvent` is deliberately not glob-imported here: `Rescue` names
    // both a stable state and an event, so every event is qualified.
    use ProvisionEvent as Ev;

    // enroll / verify
    t(&mut fsm, Enroll, Ev::Manage, Verifying);
    t(&mut fsm, Verifying, Ev::Done, Manageable);
    t(&mut fsm, Verifying, Ev::Fail, Enroll);

    // adopt
    t(&mut fsm, Manageable, Ev::Adopt, Adopting);
    t(&mut fsm, Adopting, Ev::Done, Active);
    t(&mut fsm, Adopting, Ev::Fail, AdoptFail);
    t(&mut fsm, AdoptFail, Ev::Adopt, Adopting);

    // inspect
    t(&mut fsm, Manageable, Ev::Inspect, Inspecting);
    t(&mut fsm, Inspecting, Ev::Wait, InspectWait);
    t(&mut fsm, InspectWait, Ev::Resume, Inspecting);
    t(&mut fsm, Inspecting, Ev::Done, Manageable);
    t(&mut fsm, Inspecting, Ev::Fail, InspectFail);
    t(&mut fsm, InspectWait, Ev::Fail, InspectFail);
    t(&mut fsm, InspectFail, Ev::Inspect, Inspecting);

    // deploy
    t(&mut fsm, Available, Ev::Deploy, Deploying);
    t(&mut fsm, Deploying, Ev::Wait, DeployWait);
    t(&mut fsm, DeployWait, Ev::Resume, Deploying);
    t(&mut fsm, Deploying, Ev::Done, Active);
    t(&mut fsm, Deploying, Ev::Fail, DeployFail);
    t(&mut fsm, DeployWait, Ev::Fail, DeployFail);
    t(&mut fsm, DeployFail, Ev::Rebuild, Deploying);
    t(&mut fsm, DeployFail, Ev::Deploy, Deploying);
    t(&mut fsm, Active, Ev::Rebuild, Deploying);
    t(&mut fsm, DeployHold, Ev::Unhold, DeployWait);

    // delete / clean — invariant 5: maintenance never blocks delete, so
    // delete is reachable from every resting point a node can be deleted from.
    t(&mut fsm, Available, Ev::Delete, Deleting);
    t(&mut fsm, Active, Ev::Delete, Deleting);
    t(&mut fsm, Error, Ev::Delete, Deleting);
    t(&mut fsm, DeployWait, Ev::Delete, Deleting);
    t(&mut fsm, DeployFail, Ev::Delete, Deleting);
    t(&mut fsm, Deleting, Ev::Clean, Cleaning);
    t(&mut fsm, Deleting, Ev::Fail, Error);

    t(&mut fsm, Manageable, Ev::Provide, Cleaning);
    t(&mut fsm, Manageable, Ev::Clean, Cleaning);
    t(&mut fsm, Cleaning, Ev::Wait, CleanWait);
    t(&mut fsm, CleanWait, Ev::Resume, Cleaning);
    t(&mut fsm, Cleaning, Ev::Done, Available);
    t(&mut fsm, Cleaning, Ev::Fail, CleanFail);
    t(&mut fsm, Cleaning, Ev::Abort, CleanFail);
    t(&mut fsm, CleanWait, Ev::Fail, CleanFail);
    t(&mut fsm, CleanWait, Ev::Abort, CleanFail);
    t(&mut fsm, CleanHold, Ev::Unhold, CleanWait);
    t(&mut fsm, CleanFail, Ev::Delete, Deleting);

    // rescue / unrescue mirror deploy
    t(&mut fsm, Active, Ev::Rescue, Rescuing);
    t(&mut fsm, Rescuing, Ev::Wait, RescueWait);
    t(&mut fsm, RescueWait, Ev::Resume, Rescuing);
    t(&mut fsm, Rescuing, Ev::Done, ProvisionState::Rescue);
    t(&mut fsm, Rescuing, Ev::Fail, RescueFail);
    t(&mut fsm, RescueWait, Ev::Fail, RescueFail);
    t(&mut fsm, RescueFail, Ev::Rescue, Rescuing);
    t(&mut fsm, ProvisionState::Rescue, Ev::Unrescue, Unrescuing);
    t(&mut fsm, Unrescuing, Ev::Done, Active);
    t(&mut fsm, Unrescuing, Ev::Fail, UnrescueFail);
    t(&mut fsm, UnrescueFail, Ev::Unrescue, Unrescuing);

    // service mirrors deploy
    t(&mut fsm, Active, Ev::Service, Servicing);
    t(&mut fsm, Servicing, Ev::Wait, ServiceWait);
    t(&mut fsm, ServiceWait, Ev::Resume, Servicing);
    t(&mut fsm, Servicing, Ev::Done, Active);
    t(&mut fsm, Servicing, Ev::Fail, ServiceFail);
    t(&mut fsm, ServiceWait, Ev::Fail, ServiceFail);
    t(&mut fsm, ServiceFail, Ev::Service, Servicing);
    t(&mut fsm, ServiceHold, Ev::Unhold, ServiceWait);

    fsm
}

/// The workflow a transient provision state belongs to, used to name which
/// `*_step`/`*_step_index` fields the step executor persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    Deploy,
    Clean,
    Service,
    Rescue,
    Inspect,
}

impl ProvisionState {
    /// The workflow this transient state belongs to, or `None` for stable states.
    pub fn workflow(&self) -> Option<Workflow> {
        use ProvisionState::*;
        match self {
            Deploying | DeployWait | DeployFail | DeployHold => Some(Workflow::Deploy),
            Cleaning | CleanWait | CleanFail | CleanHold | Deleting => Some(Workflow::Clean),
            Servicing | ServiceWait | ServiceFail | ServiceHold => Some(Workflow::Service),
            Rescuing | RescueWait | RescueFail | Unrescuing | UnrescueFail => Some(Workflow::Rescue),
            Inspecting | InspectWait | InspectFail | Verifying => Some(Workflow::Inspect),
            _ => None,
        }
    }

    pub fn is_wait_state(&self) -> bool {
        matches!(
            self,
            ProvisionState::DeployWait
                | ProvisionState::CleanWait
                | ProvisionState::InspectWait
                | ProvisionState::RescueWait
                | ProvisionState::ServiceWait
        )
    }

    pub fn is_fail_state(&self) -> bool {
        matches!(
            self,
            ProvisionState::DeployFail
                | ProvisionState::CleanFail
                | ProvisionState::InspectFail
                | ProvisionState::RescueFail
                | ProvisionState::UnrescueFail
                | ProvisionState::AdoptFail
                | ProvisionState::ServiceFail
        )
    }
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
