// SPDX-License-Identifier: MIT

//! Service-wide tunables, loadable from TOML. Lives here (rather than in a
//! higher-level crate) because the task manager's retry/backoff, the step
//! executor's callback timeouts, the periodic loops' thresholds, and the
//! hash ring's replica count all need it, and none of those crates should
//! depend on each other just to share configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration for a conductor process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Hostname this conductor registers under. Defaults to the machine's
    /// hostname at load time if left blank.
    pub hostname: String,
    pub hardware_types: Vec<String>,

    pub lock: LockSettings,
    pub callback_timeouts: CallbackTimeouts,
    pub periodic: PeriodicSettings,
    pub power_sync: PowerSyncSettings,
    pub hash_ring: HashRingSettings,
    pub heartbeat: HeartbeatSettings,
    pub configdrive: ConfigDriveSettings,
    pub sensors: SensorSettings,
    pub worker_pools: WorkerPoolSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            hardware_types: vec!["fake-hardware".to_string()],
            lock: LockSettings::default(),
            callback_timeouts: CallbackTimeouts::default(),
            periodic: PeriodicSettings::default(),
            power_sync: PowerSyncSettings::default(),
            hash_ring: HashRingSettings::default(),
            heartbeat: HeartbeatSettings::default(),
            configdrive: ConfigDriveSettings::default(),
            sensors: SensorSettings::default(),
            worker_pools: WorkerPoolSettings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from a TOML document, applying defaults for anything
    /// left unspecified.
    pub fn from_toml(raw: &str) -> Result<Self, crate::error::ConductorError> {
        toml::from_str(raw).map_err(|e| crate::error::ConductorError::Internal(format!("invalid settings: {e}")))
    }
}

/// Exclusive-acquisition retry policy (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub acquire_retries: u32,
    pub acquire_retry_interval_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self { acquire_retries: 3, acquire_retry_interval_ms: 500 }
    }
}

/// Per-workflow wait-state callback timeouts (spec §4.4/§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackTimeouts {
    pub deploy_callback_timeout_ms: u64,
    pub clean_callback_timeout_ms: u64,
    pub inspect_callback_timeout_ms: u64,
    pub rescue_callback_timeout_ms: u64,
    pub service_callback_timeout_ms: u64,
}

impl Default for CallbackTimeouts {
    fn default() -> Self {
        Self {
            deploy_callback_timeout_ms: 60 * 60 * 1000,
            clean_callback_timeout_ms: 30 * 60 * 1000,
            inspect_callback_timeout_ms: 30 * 60 * 1000,
            rescue_callback_timeout_ms: 30 * 60 * 1000,
            service_callback_timeout_ms: 30 * 60 * 1000,
        }
    }
}

/// Periodic-loop cadence and concurrency caps (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodicSettings {
    pub tick_interval_ms: u64,
    pub periodic_max_workers: usize,
    pub conductor_offline_threshold_ms: u64,
}

impl Default for PeriodicSettings {
    fn default() -> Self {
        Self { tick_interval_ms: 60_000, periodic_max_workers: 8, conductor_offline_threshold_ms: 90_000 }
    }
}

/// Power-state reconciliation policy (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerSyncSettings {
    pub force_power_state_during_sync: bool,
    pub power_state_sync_max_retries: u32,
}

impl Default for PowerSyncSettings {
    fn default() -> Self {
        Self { force_power_state_during_sync: false, power_state_sync_max_retries: 3 }
    }
}

/// Hash ring replica count (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashRingSettings {
    pub replicas: u32,
}

impl Default for HashRingSettings {
    fn default() -> Self {
        Self { replicas: 40 }
    }
}

/// Conductor-row heartbeat cadence (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    pub interval_ms: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self { interval_ms: 10_000 }
    }
}

/// Deploy's configdrive inline-vs-uploaded threshold (spec §4.4
/// "Deploy-specific wrappers").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDriveSettings {
    pub inline_max_bytes: usize,
    pub object_store_container: String,
}

impl Default for ConfigDriveSettings {
    fn default() -> Self {
        Self { inline_max_bytes: 64 * 1024, object_store_container: "conductor-configdrive".to_string() }
    }
}

/// Bounded worker pool capacities (spec §4.3/§5: "public RPC entry points
/// must never block on driver I/O" — `SpawnAfter` hands the I/O off to
/// these).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolSettings {
    pub primary_capacity: usize,
    /// Kept deliberately small and separate from `primary_capacity` so a
    /// saturated primary pool can never starve deploy-agent keepalives
    /// (spec §4.3 step 4).
    pub heartbeat_capacity: usize,
}

impl Default for WorkerPoolSettings {
    fn default() -> Self {
        Self { primary_capacity: 100, heartbeat_capacity: 16 }
    }
}

/// Sensor telemetry shipping (spec §4.5 "Sensor shipper", optional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    pub enabled: bool,
    pub send_sensor_data_types: Vec<String>,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self { enabled: false, send_sensor_data_types: vec!["ALL".to_string()] }
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
