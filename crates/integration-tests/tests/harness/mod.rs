//! Shared end-to-end test scaffolding
//!
//! Each test binary compiles its own copy, so not every helper is used
//! everywhere.
#![allow(dead_code)]

pub mod host;
pub mod provider;

/// Path to the mock upstream binary built alongside the tests
pub fn mock_upstream_bin() -> &'static str {
    env!("CARGO_BIN_EXE_mock_upstream")
}
