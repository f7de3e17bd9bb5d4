// SPDX-License-Identifier: MIT

//! The node data model: `Node`, `Port`, `Portgroup`, and the `Conductor`
//! registry row, per the persisted state shape every other crate builds on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{ConductorId, NodeId, PortId, PortgroupId};
use conductor_fsm::ProvisionState;

/// A single step in a deploy/clean/service/rescue/inspect step list.
///
/// Mirrors the driver-advertised step metadata: which interface implements
/// it, its name, execution priority (higher runs first), free-form argument
/// schema, and whether it may be aborted mid-flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub interface: String,
    pub step: String,
    pub priority: u32,
    #[serde(default)]
    pub args: HashMap<String, Value>,
    #[serde(default)]
    pub abortable: bool,
    /// Whether this step's contract includes rebooting the node and
    /// reconnecting an in-band agent. Drives the executor's oob-reboot
    /// special case: an "agent lost connection" failure on a step with this
    /// flag set is treated as an expected wait, not a failure.
    #[serde(default)]
    pub deployment_reboot: bool,
}

impl StepDescriptor {
    pub fn new(interface: impl Into<String>, step: impl Into<String>, priority: u32) -> Self {
        Self {
            interface: interface.into(),
            step: step.into(),
            priority,
            args: HashMap::new(),
            abortable: false,
            deployment_reboot: false,
        }
    }

    pub fn abortable(mut self) -> Self {
        self.abortable = true;
        self
    }

    pub fn deployment_reboot(mut self) -> Self {
        self.deployment_reboot = true;
        self
    }
}

/// The central entity: a physical machine under management.
///
/// Invariants enforced by mutation methods on this type (see module docs for
/// the full list; store-level invariants like MAC uniqueness and the
/// reservation-to-live-conductor mapping are enforced by `conductor-store`
/// and `conductor-task`, not here):
///
/// 1. `reservation` is either `None` or a live conductor's hostname.
/// 2. `target_provision_state` is only set while `provision_state` is transient.
/// 3. `maintenance = true` blocks deploy/clean/inspect but never delete.
/// 4. `deploy_step`/`clean_step`/`service_step` track the step currently executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Human-assigned name, unique across the store if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub driver: String,
    #[serde(default)]
    pub driver_info: HashMap<String, Value>,
    /// Private namespace owned by the core; external callers must not write here.
    #[serde(default)]
    pub driver_internal_info: HashMap<String, Value>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    #[serde(default)]
    pub instance_info: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_uuid: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,

    pub provision_state: ProvisionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_provision_state: Option<ProvisionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub maintenance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conductor_affinity: Option<ConductorId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_step: Option<StepDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clean_step: Option<StepDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_step: Option<StepDescriptor>,

    pub power_state: PowerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_power_state: Option<PowerState>,

    pub provision_updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_started_at: Option<u64>,

    /// Compare-and-swap generation, bumped on every store write.
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    PowerOn,
    PowerOff,
    Rebooting,
    Error,
}

crate::simple_display! {
    PowerState {
        PowerOn => "power on",
        PowerOff => "power off",
        Rebooting => "rebooting",
        Error => "error",
    }
}

impl Node {
    /// Whether a deploy, clean, or inspect event would currently be rejected
    /// for maintenance. Delete is deliberately excluded (invariant 5).
    pub fn blocks_maintained_workflows(&self) -> bool {
        self.maintenance
    }

    /// Whether this node's ports may have their MAC address changed:
    /// disallowed while ACTIVE/DELETING with an instance attached, unless
    /// the node is in maintenance.
    pub fn allows_mac_change(&self) -> bool {
        if self.maintenance {
            return true;
        }
        let active_or_deleting =
            matches!(self.provision_state, ProvisionState::Active | ProvisionState::Deleting);
        !(active_or_deleting && self.instance_uuid.is_some())
    }

    /// Whether ports may have their PXE-enabled flag changed: requires
    /// MANAGEABLE or maintenance.
    pub fn allows_pxe_change(&self) -> bool {
        self.maintenance || matches!(self.provision_state, ProvisionState::Manageable)
    }

    pub fn is_reserved(&self) -> bool {
        self.reservation.is_some()
    }

    pub fn reserved_by(&self, host: &str) -> bool {
        self.reservation.as_deref() == Some(host)
    }
}

/// A network port belonging to exactly one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub node_id: NodeId,
    pub address: MacAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portgroup_id: Option<PortgroupId>,
    #[serde(default)]
    pub pxe_enabled: bool,
    #[serde(default)]
    pub local_link_connection: HashMap<String, Value>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
    #[serde(default)]
    pub version: u64,
}

/// A MAC address, normalised to lowercase colon-separated hex on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddress(String);

impl MacAddress {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, crate::error::ClientError> {
        let s = raw.as_ref().trim().to_ascii_lowercase();
        let octets: Vec<&str> = s.split(':').collect();
        if octets.len() != 6 || octets.iter().any(|o| o.len() != 2 || !o.chars().all(|c| c.is_ascii_hexdigit())) {
            return Err(crate::error::ClientError::InvalidParameterValue(format!(
                "not a MAC address: {raw}",
                raw = raw.as_ref()
            )));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A portgroup belonging to exactly one node; must be empty of ports before
/// being reparented or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portgroup {
    pub id: PortgroupId,
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub address: MacAddress,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
    #[serde(default)]
    pub version: u64,
}

/// A registry row for a live conductor process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conductor {
    pub id: ConductorId,
    #[serde(default)]
    pub hardware_types: Vec<String>,
    pub updated_at_ms: u64,
}

impl Conductor {
    /// Whether this conductor's heartbeat has gone stale, given the current
    /// epoch time and the offline threshold in milliseconds.
    pub fn is_offline(&self, now_ms: u64, offline_threshold_ms: u64) -> bool {
        now_ms.saturating_sub(self.updated_at_ms) > offline_threshold_ms
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
