//! Common test utilities shared by the integration tests.
//!
//! This module provides:
//! - Test fixtures (project directories, pipelines, controllers)
//! - Polling assertions
//! - A scripted engine for driving the controller through edge cases

pub mod assertions;
pub mod fixtures;
pub mod mock_engine;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mock_engine::*;
