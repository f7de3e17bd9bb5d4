// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conductor-core: identifiers, data model, clock, error taxonomy, and
//! settings shared by every conductor crate.

pub mod macros;

pub mod backoff;
pub mod clock;
pub mod error;
pub mod id;
pub mod node;
pub mod settings;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use backoff::Backoff;
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{ClientError, ConcurrencyError, ConductorError, DriverError, StorageError};
pub use id::{ConductorId, NodeId, PortId, PortgroupId};
pub use node::{Conductor, Node, Port, PowerState, Portgroup, StepDescriptor};
pub use settings::Settings;
