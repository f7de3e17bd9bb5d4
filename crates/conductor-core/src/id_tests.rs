// SPDX-License-Identifier: MIT

use super::*;
use std::collections::HashMap;

define_uuid_id! {
    /// Test ID type for macro verification.
    pub struct TestId;
}

#[test]
fn define_uuid_id_hash_map_lookup() {
    let mut map = HashMap::new();
    let id = TestId::new();
    map.insert(id, 42);
    assert_eq!(map.get(&id), Some(&42));
}

#[test]
fn define_uuid_id_new_is_unique() {
    assert_ne!(TestId::new(), TestId::new());
}

#[test]
fn define_uuid_id_round_trips_through_string() {
    let id = TestId::new();
    let parsed = TestId::parse_str(&id.to_string()).expect("valid uuid");
    assert_eq!(id, parsed);
}

#[test]
fn define_uuid_id_serde_round_trip() {
    let id = TestId::new();
    let json = serde_json::to_string(&id).expect("serialize");
    assert_eq!(json, format!("\"{}\"", id));
    let parsed: TestId = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(id, parsed);
}

#[test]
fn define_uuid_id_rejects_malformed_string() {
    assert!(TestId::parse_str("not-a-uuid").is_err());
}

#[test]
fn conductor_id_borrows_as_str() {
    let id = ConductorId::new("conductor-1.example.com");
    let mut map = HashMap::new();
    map.insert(id.clone(), ());
    assert!(map.contains_key("conductor-1.example.com"));
}

#[test]
fn conductor_id_display() {
    let id = ConductorId::from("host-a".to_string());
    assert_eq!(id.to_string(), "host-a");
    assert_eq!(id.as_str(), "host-a");
}

#[test]
fn conductor_id_ordering_is_lexicographic() {
    let a = ConductorId::new("a");
    let b = ConductorId::new("b");
    assert!(a < b);
}
