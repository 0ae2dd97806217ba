//! Shared test utilities for the dr-engine integration tests.
//!
//! - `TestHarness` runs a full engine on a temporary database
//! - `AppBuilder` assembles application definitions without JSON boilerplate

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
