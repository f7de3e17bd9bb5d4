// SPDX-License-Identifier: MIT

//! The cross-conductor forwarding boundary (spec §4.3: "Every externally
//! invoked operation first verifies that the node is mapped to this
//! conductor ... if not, it forwards via RPC").
//!
//! The conductor-to-conductor RPC transport itself belongs to the same
//! external-collaborator bucket as the REST API (spec §1 non-goal): this
//! core's job ends at detecting non-locality and naming the owning
//! conductor. A production deployment injects a real [`NodeForwarder`] (a
//! gRPC or HTTP client to the sibling conductor); the reference
//! implementation below simply reports that no such transport is wired up,
//! mirroring how `conductor-executor`'s `ObjectStore`/`ConfigDriveBuilder`
//! ship in-memory stand-ins for their own external collaborators.

use async_trait::async_trait;
use conductor_core::error::ConductorError;
use conductor_core::ConductorId;

/// Forwards an already-serialised RPC call to the conductor that actually
/// owns a node, when the hash ring says it isn't this process.
#[async_trait]
pub trait NodeForwarder: Send + Sync {
    async fn forward(&self, owner: &ConductorId, method: &str) -> Result<(), ConductorError>;
}

/// The reference implementation: no transport configured, so every forward
/// fails loudly rather than silently dropping the request.
#[derive(Debug, Default)]
pub struct NoForwarder;

#[async_trait]
impl NodeForwarder for NoForwarder {
    async fn forward(&self, owner: &ConductorId, method: &str) -> Result<(), ConductorError> {
        Err(ConductorError::Internal(format!(
            "{method}: node is owned by conductor {owner}, and no NodeForwarder is configured on this process"
        )))
    }
}
