// SPDX-License-Identifier: MIT

//! Test builders shared by every crate's test suite. Gated behind
//! `#[cfg(any(test, feature = "test-support"))]` so non-test builds never
//! pay for them.

use std::collections::HashMap;

use conductor_fsm::ProvisionState;

use crate::id::{ConductorId, NodeId};
use crate::node::{Conductor, Node, PowerState, StepDescriptor};

crate::builder! {
    pub struct NodeBuilder => Node {
        into {
            driver: String = "fake-hardware",
        }
        set {
            driver_info: HashMap<String, serde_json::Value> = HashMap::new(),
            driver_internal_info: HashMap<String, serde_json::Value> = HashMap::new(),
            properties: HashMap<String, serde_json::Value> = HashMap::new(),
            instance_info: HashMap<String, serde_json::Value> = HashMap::new(),
            extra: HashMap<String, serde_json::Value> = HashMap::new(),
            provision_state: ProvisionState = ProvisionState::Available,
            maintenance: bool = false,
            power_state: PowerState = PowerState::PowerOff,
            provision_updated_at: u64 = 0,
            version: u64 = 0,
        }
        option {
            name: String = None,
            instance_uuid: String = None,
            target_provision_state: ProvisionState = None,
            last_error: String = None,
            maintenance_reason: String = None,
            reservation: String = None,
            conductor_affinity: ConductorId = None,
            deploy_step: StepDescriptor = None,
            clean_step: StepDescriptor = None,
            service_step: StepDescriptor = None,
            target_power_state: PowerState = None,
            inspection_started_at: u64 = None,
        }
        computed {
            id: NodeId = NodeId::new(),
        }
    }
}

crate::builder! {
    pub struct ConductorBuilder => Conductor {
        into {
            id: ConductorId = "test-conductor",
        }
        set {
            hardware_types: Vec<String> = vec!["fake-hardware".to_string()],
            updated_at_ms: u64 = 0,
        }
    }
}

#[cfg(test)]
#[path = "test_support_tests.rs"]
mod tests;
