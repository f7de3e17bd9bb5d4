// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conductor-driver: the capability-based driver façade (spec §4.6) — fixed
//! interface slots, a static step cache keyed by hardware type, and a
//! deterministic fake driver for tests and the demo binary.

pub mod fake;
pub mod interface;
pub mod registry;

pub use fake::fake_driver;
pub use interface::{
    BiosInterface, BootDeviceInfo, BootInterface, ConsoleInterface, DeployInterface, HttpMethod,
    InspectInterface, Interface, ManagementInterface, PowerInterface, PrepareOutcome, RaidInterface,
    StepOutcome, TaskView, VendorInterface, VendorRoute,
};
pub use registry::{Driver, DriverRegistry};
