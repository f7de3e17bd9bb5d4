// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conductor-executor: the step executor (spec §4.4) — runs a workflow's
//! ordered step list against a [`conductor_task::Task`], handling
//! validation, wait/resume, abort, the oob-reboot special case, and
//! deploy's configdrive hand-off.

pub mod configdrive;
pub mod executor;

pub use configdrive::{ConfigDrive, ConfigDriveBuilder, InMemoryObjectStore, JsonConfigDriveBuilder, ObjectStore};
pub use executor::StepExecutor;
