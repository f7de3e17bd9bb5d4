// SPDX-License-Identifier: MIT

//! Identifier types for node-model entities.

use std::fmt;

/// Define a newtype identifier wrapping a [`uuid::Uuid`].
///
/// Generates `new()` for random generation, `parse_str()`/`from_uuid()` for
/// construction from existing values, `Display`, `Serialize`/`Deserialize`
/// (transparent, as the canonical UUID string), `From<Uuid>`, and `Deref<Target = Uuid>`.
///
/// ```ignore
/// define_uuid_id! {
///     /// Doc comment for the ID type.
///     pub struct NodeId;
/// }
/// ```
#[macro_export]
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Generate a new random (v4) identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: uuid::Uuid) -> Self {
                Self(id)
            }

            /// Parse from its canonical string form.
            pub fn parse_str(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }

            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(id: uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl std::ops::Deref for $name {
            type Target = uuid::Uuid;

            fn deref(&self) -> &uuid::Uuid {
                &self.0
            }
        }
    };
}

define_uuid_id! {
    /// Identifies a [`crate::node::Node`].
    pub struct NodeId;
}

define_uuid_id! {
    /// Identifies a [`crate::node::Port`].
    pub struct PortId;
}

define_uuid_id! {
    /// Identifies a [`crate::node::Portgroup`].
    pub struct PortgroupId;
}

/// Identifies a conductor process by its hostname.
///
/// Unlike the UUID-backed identifiers above, conductors are identified by
/// the hostname they were registered under — stable across restarts, and
/// the value the hash ring hashes against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ConductorId(String);

impl ConductorId {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self(hostname.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConductorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConductorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConductorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for ConductorId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
