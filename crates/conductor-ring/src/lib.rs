// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! conductor-ring: the consistent hash ring mapping `(node, driver)` to an
//! owning conductor (spec §4.7).

pub mod ring;

pub use ring::HashRing;
