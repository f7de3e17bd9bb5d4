// SPDX-License-Identifier: MIT

//! Deploy's configdrive hand-off (spec §4.4 "Deploy-specific wrappers"):
//! inline-vs-object-store threshold, TTL from the deploy callback timeout,
//! and rendering for structured configdrives.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use conductor_core::error::DriverError;

/// Caller-supplied configdrive payload: either a pre-rendered blob, or
/// cloud-init-style structured pieces the core assembles before hand-off.
#[derive(Debug, Clone)]
pub enum ConfigDrive {
    Literal(String),
    Structured {
        user_data: Option<Value>,
        meta_data: Option<Value>,
        network_data: Option<Value>,
        vendor_data: Option<Value>,
    },
}

/// Renders a structured configdrive into the form `store_configdrive`
/// persists. A real implementation builds an ISO9660 image; image-building
/// tooling is outside this core's scope (spec §1), so the reference
/// implementation below renders a plain JSON document instead.
#[async_trait]
pub trait ConfigDriveBuilder: Send + Sync {
    async fn build(
        &self,
        user_data: Option<&Value>,
        meta_data: Option<&Value>,
        network_data: Option<&Value>,
        vendor_data: Option<&Value>,
    ) -> Result<String, DriverError>;
}

#[derive(Debug, Default)]
pub struct JsonConfigDriveBuilder;

#[async_trait]
impl ConfigDriveBuilder for JsonConfigDriveBuilder {
    async fn build(
        &self,
        user_data: Option<&Value>,
        meta_data: Option<&Value>,
        network_data: Option<&Value>,
        vendor_data: Option<&Value>,
    ) -> Result<String, DriverError> {
        Ok(serde_json::json!({
            "user_data": user_data,
            "meta_data": meta_data,
            "network_data": network_data,
            "vendor_data": vendor_data,
        })
        .to_string())
    }
}

/// Object-store hand-off for configdrives that exceed the inline threshold
/// (spec §6 "Object Store (optional)").
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn create_object(
        &self,
        container: &str,
        name: &str,
        bytes: Vec<u8>,
        delete_after_ms: Option<u64>,
    ) -> Result<(), DriverError>;

    async fn get_temp_url(&self, container: &str, name: &str, ttl_ms: u64) -> Result<String, DriverError>;
}

/// An in-memory stand-in so tests can exercise the uploaded-configdrive
/// branch without a real object store.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn create_object(
        &self,
        container: &str,
        name: &str,
        bytes: Vec<u8>,
        _delete_after_ms: Option<u64>,
    ) -> Result<(), DriverError> {
        self.objects.lock().insert((container.to_string(), name.to_string()), bytes);
        Ok(())
    }

    async fn get_temp_url(&self, container: &str, name: &str, ttl_ms: u64) -> Result<String, DriverError> {
        if !self.objects.lock().contains_key(&(container.to_string(), name.to_string())) {
            return Err(DriverError::ContractViolation(format!("no such object: {container}/{name}")));
        }
        Ok(format!("https://object-store.invalid/{container}/{name}?ttl={ttl_ms}"))
    }
}

#[cfg(test)]
#[path = "configdrive_tests.rs"]
mod tests;
