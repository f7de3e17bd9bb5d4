// SPDX-License-Identifier: MIT

//! Error taxonomy shared by every conductor crate.
//!
//! Kinds map to spec §7: client-caused, transient/concurrency, driver-reported,
//! storage I/O, and unexpected-internal. Workflow code converts `DriverError`s
//! into `*FAIL` transitions rather than propagating them to RPC callers; see
//! `conductor-executor`.

use thiserror::Error;

/// The request itself was malformed or referred to something missing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("invalid parameter value: {0}")]
    InvalidParameterValue(String),
    #[error("missing parameter value: {0}")]
    MissingParameterValue(String),
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("port not found: {0}")]
    PortNotFound(String),
    #[error("invalid state requested: {0}")]
    InvalidStateRequested(String),
    #[error("unsupported driver extension: {0}")]
    UnsupportedDriverExtension(String),
    #[error("node {0} is in maintenance")]
    NodeInMaintenance(String),
    #[error("node {0} is associated with an instance")]
    NodeAssociated(String),
    #[error("MAC address already exists: {0}")]
    MacAlreadyExists(String),
    #[error("portgroup {0} is not empty")]
    PortgroupNotEmpty(String),
}

/// Transient serialisation failures — safe for the caller to retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConcurrencyError {
    #[error("node {0} is locked by another conductor")]
    NodeLocked(String),
    #[error("no free conductor worker")]
    NoFreeConductorWorker,
}

/// A failure reported by the driver stack.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("driver not found: {0}")]
    DriverNotFound(String),
    #[error("power state failure: {0}")]
    PowerStateFailure(String),
    #[error("instance deploy failure: {0}")]
    InstanceDeployFailure(String),
    #[error("node cleaning failure: {0}")]
    NodeCleaningFailure(String),
    #[error("hardware inspection failure: {0}")]
    HardwareInspectionFailure(String),
    #[error("console error: {0}")]
    ConsoleError(String),
    #[error("failed to update MAC on port: {0}")]
    FailedToUpdateMacOnPort(String),
    #[error("failed to update DHCP options on port: {0}")]
    FailedToUpdateDhcpOptOnPort(String),
    #[error("driver contract violation: {0}")]
    ContractViolation(String),
}

/// DB or object-store I/O failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("object store operation failed: {0}")]
    ObjectStoreError(String),
    #[error("storage data error: {0}")]
    DataError(String),
    #[error("compare-and-swap conflict on node {0}")]
    VersionConflict(String),
}

/// Top-level error composing every taxonomy kind, plus unexpected internal
/// failures that must never be silently swallowed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConductorError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConductorError {
    /// True for errors an RPC caller may usefully retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConductorError::Concurrency(_))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
