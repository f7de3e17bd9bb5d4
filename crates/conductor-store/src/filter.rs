// SPDX-License-Identifier: MIT

//! Query shapes passed to [`crate::store::NodeStore::list_node_info`].

use conductor_fsm::ProvisionState;

/// Filter applied when enumerating nodes. `None` on any field means "don't
/// filter on this column"; every non-`None` field narrows the result set
/// (fields are ANDed together).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeFilter {
    /// Match nodes whose `reservation` is exactly this (so `Some(None)`
    /// means "unreserved", `Some(Some(host))` means "reserved by `host`").
    pub reservation: Option<Option<String>>,
    pub maintenance: Option<bool>,
    /// Match any of the listed provision states.
    pub provision_state: Option<Vec<ProvisionState>>,
    /// Match nodes whose `provision_updated_at` is strictly before this
    /// epoch-ms timestamp — the periodic timeout sweepers' primary filter.
    pub provisioned_before_ms: Option<u64>,
    pub driver: Option<String>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reservation(mut self, v: Option<String>) -> Self {
        self.reservation = Some(v);
        self
    }

    pub fn maintenance(mut self, v: bool) -> Self {
        self.maintenance = Some(v);
        self
    }

    pub fn provision_state(mut self, states: Vec<ProvisionState>) -> Self {
        self.provision_state = Some(states);
        self
    }

    pub fn provisioned_before_ms(mut self, ms: u64) -> Self {
        self.provisioned_before_ms = Some(ms);
        self
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }
}

/// Sort order for [`crate::store::NodeStore::list_node_info`]. The periodic
/// timeout sweepers sort ascending on `provision_updated_at` so the
/// longest-waiting node is handled first within a capped tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeSort {
    #[default]
    None,
    ProvisionUpdatedAtAsc,
    ProvisionUpdatedAtDesc,
}
