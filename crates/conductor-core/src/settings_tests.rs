// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn defaults_are_sane() {
    let settings = Settings::default();
    assert_eq!(settings.lock.acquire_retries, 3);
    assert_eq!(settings.hash_ring.replicas, 40);
    assert!(!settings.power_sync.force_power_state_during_sync);
    assert_eq!(settings.configdrive.inline_max_bytes, 64 * 1024);
    assert_eq!(settings.worker_pools.primary_capacity, 100);
    assert_eq!(settings.worker_pools.heartbeat_capacity, 16);
}

#[test]
fn from_toml_overrides_only_specified_fields() {
    let raw = r#"
        hostname = "conductor-a"

        [lock]
        acquire_retries = 10

        [power_sync]
        force_power_state_during_sync = true
        power_state_sync_max_retries = 1
    "#;
    let settings = Settings::from_toml(raw).unwrap();
    assert_eq!(settings.hostname, "conductor-a");
    assert_eq!(settings.lock.acquire_retries, 10);
    assert_eq!(settings.lock.acquire_retry_interval_ms, 500);
    assert!(settings.power_sync.force_power_state_during_sync);
    assert_eq!(settings.power_sync.power_state_sync_max_retries, 1);
    assert_eq!(settings.periodic.periodic_max_workers, 8);
}

#[test]
fn from_toml_rejects_garbage() {
    let err = Settings::from_toml("not valid toml [[[").unwrap_err();
    assert!(matches!(err, crate::error::ConductorError::Internal(_)));
}
