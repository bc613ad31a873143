//! Test utilities for docsync
//!
//! Timeout helpers plus transport and replica fixtures shared by unit
//! tests, the integration tests and the simulator.

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::*;
pub use fixtures::*;
