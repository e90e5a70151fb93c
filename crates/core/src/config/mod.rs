//! Configuration loading and management.
//!
//! This module provides functionality to load controller settings and
//! pipeline definitions from a project root directory.

pub mod error;
pub mod loader;
pub mod models;
