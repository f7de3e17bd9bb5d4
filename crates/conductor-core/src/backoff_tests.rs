// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn exhausts_after_max_attempts() {
    let backoff = Backoff::new(100, 10_000, 3);
    assert!(backoff.delay_for(0, 1).is_some());
    assert!(backoff.delay_for(1, 1).is_some());
    assert!(backoff.delay_for(2, 1).is_some());
    assert!(backoff.delay_for(3, 1).is_none());
}

#[test]
fn delay_grows_exponentially_before_capping() {
    let backoff = Backoff::new(100, 10_000, 10);
    let d0 = backoff.delay_for(0, 42).unwrap();
    let d1 = backoff.delay_for(1, 42).unwrap();
    let d2 = backoff.delay_for(2, 42).unwrap();
    assert!(d0 <= 100);
    assert!(d1 <= 200);
    assert!(d2 <= 400);
}

#[test]
fn delay_never_exceeds_max() {
    let backoff = Backoff::new(100, 500, 10);
    for attempt in 0..10 {
        let delay = backoff.delay_for(attempt, 7).unwrap();
        assert!(delay <= 500, "attempt {attempt} delay {delay} exceeded cap");
    }
}

#[test]
fn same_attempt_and_seed_is_deterministic() {
    let backoff = Backoff::new(100, 10_000, 5);
    assert_eq!(backoff.delay_for(2, 99), backoff.delay_for(2, 99));
}

#[test]
fn different_seeds_can_produce_different_delays() {
    let backoff = Backoff::new(100, 10_000, 5);
    let a = backoff.delay_for(2, 1).unwrap();
    let b = backoff.delay_for(2, 2).unwrap();
    // not a strict guarantee for arbitrary hash functions, but true for this seed pair
    assert_ne!(a, b);
}
