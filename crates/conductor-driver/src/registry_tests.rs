// SPDX-License-Identifier: MIT

use super::*;
use crate::fake::fake_driver;

#[test]
fn unregistered_hardware_type_is_not_found() {
    let registry = DriverRegistry::new();
    assert!(matches!(registry.get("fake-hardware"), Err(DriverError::DriverNotFound(_))));
}

#[test]
fn registering_caches_steps_per_workflow() {
    let registry = DriverRegistry::new();
    registry.register(fake_driver("fake-hardware")).unwrap();

    let clean_steps = registry.steps_for("fake-hardware", Workflow::Clean).unwrap();
    let names: Vec<&str> = clean_steps.iter().map(|s| s.step.as_str()).collect();
    assert!(names.contains(&"erase_disks"));
    assert!(names.contains(&"update_firmware"));

    // Descending priority, ties broken by (interface, step) name.
    for pair in clean_steps.windows(2) {
        assert!(pair[0].priority >= pair[1].priority);
    }
}

#[test]
fn steps_for_is_empty_not_missing_when_workflow_contributes_nothing() {
    let registry = DriverRegistry::new();
    registry.register(fake_driver("fake-hardware")).unwrap();
    let rescue_steps = registry.steps_for("fake-hardware", Workflow::Rescue);
    assert_eq!(rescue_steps.unwrap(), Vec::new());
}

#[test]
fn hardware_types_lists_every_registered_driver() {
    let registry = DriverRegistry::new();
    registry.register(fake_driver("fake-hardware")).unwrap();
    registry.register(fake_driver("other-hardware")).unwrap();
    let mut types = registry.hardware_types();
    types.sort();
    assert_eq!(types, vec!["fake-hardware".to_string(), "other-hardware".to_string()]);
}
