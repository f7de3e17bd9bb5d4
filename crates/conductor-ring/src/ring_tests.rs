// SPDX-License-Identifier: MIT

use super::*;

fn members(names: &[&str]) -> Vec<ConductorId> {
    names.iter().map(|n| ConductorId::new(*n)).collect()
}

#[test]
fn empty_ring_has_no_owner() {
    let ring = HashRing::new(10);
    assert!(ring.is_empty());
    assert!(ring.owner_for(&NodeId::new(), "fake-hardware").is_none());
}

#[test]
fn lookup_is_deterministic_for_a_fixed_membership() {
    let ring = HashRing::new(20);
    ring.rebuild(&members(&["host-a", "host-b", "host-c"]));

    let node_id = NodeId::new();
    let first = ring.owner_for(&node_id, "fake-hardware");
    for _ in 0..10 {
        assert_eq!(ring.owner_for(&node_id, "fake-hardware"), first);
    }
}

#[test]
fn node_is_local_matches_owner_for() {
    let ring = HashRing::new(20);
    ring.rebuild(&members(&["host-a", "host-b"]));
    let node_id = NodeId::new();
    let owner = ring.owner_for(&node_id, "fake-hardware").unwrap();
    assert!(ring.node_is_local(&node_id, "fake-hardware", &owner));
    let other = if owner.as_str() == "host-a" { ConductorId::new("host-b") } else { ConductorId::new("host-a") };
    assert!(!ring.node_is_local(&node_id, "fake-hardware", &other));
}

#[test]
fn removing_a_member_only_remaps_its_own_share() {
    let ring = HashRing::new(40);
    let all = members(&["host-a", "host-b", "host-c", "host-d"]);
    ring.rebuild(&all);

    let node_ids: Vec<NodeId> = (0..200).map(|_| NodeId::new()).collect();
    let before: Vec<_> = node_ids.iter().map(|n| ring.owner_for(n, "fake-hardware")).collect();

    let remaining = members(&["host-a", "host-b", "host-c"]);
    ring.rebuild(&remaining);
    let after: Vec<_> = node_ids.iter().map(|n| ring.owner_for(n, "fake-hardware")).collect();

    let remapped = before.iter().zip(after.iter()).filter(|(b, a)| b != a).count();
    // Every node whose owner left must remap; nodes owned by a surviving
    // member should mostly stay put. Loose bound: remaps shouldn't touch
    // everyone (that would indicate hashing ignores the key entirely).
    assert!(remapped < node_ids.len());
    assert!(after.iter().all(|o| o.as_ref() != Some(&ConductorId::new("host-d"))));
}

#[test]
fn different_drivers_on_the_same_node_may_map_differently() {
    let ring = HashRing::new(40);
    ring.rebuild(&members(&["host-a", "host-b", "host-c"]));
    let node_id = NodeId::new();
    let a = ring.owner_for(&node_id, "driver-a");
    let b = ring.owner_for(&node_id, "driver-b");
    // Not asserting inequality (they could coincidentally match); just that
    // both resolve to a live member.
    assert!(a.is_some());
    assert!(b.is_some());
}
