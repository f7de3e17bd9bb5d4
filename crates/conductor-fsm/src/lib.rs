// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conductor-fsm: a generic finite state machine library, and the concrete
//! provisioning state machine built from it.
//!
//! [`fsm::Fsm`] is domain-agnostic and has no knowledge of node provisioning;
//! [`provision`] wires it up into the specific states, events, and
//! transitions a node moves through over its lifecycle.

pub mod fsm;
pub mod provision;

pub use fsm::{Fsm, FsmError, Hook, StateSpec};
pub use provision::{build_provision_fsm, ProvisionEvent, ProvisionState, Workflow};
