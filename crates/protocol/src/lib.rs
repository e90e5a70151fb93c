//! # pr-protocol
//!
//! Core protocol definitions and data models for the production run controller.
//!
//! This crate defines all shared data structures used for:
//! - Pipeline definition files (YAML pipelines, TOML settings)
//! - Persisted run state and snapshot status
//! - Notifications emitted by the controller to its observers
//!
//! ## Modules
//!
//! - [`config_models`]: Controller settings from config.toml
//! - [`pipeline_models`]: Pipeline definitions and stage configuration
//! - [`record_models`]: Records flowing through a running pipeline
//! - [`state_models`]: Lifecycle status, pipeline state and snapshot status
//! - [`ipc`]: Events published by the controller
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, chrono and uuid
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other crates of this workspace

pub mod config_models;
pub mod ipc;
pub mod pipeline_models;
pub mod record_models;
pub mod state_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use ipc::*;
pub use pipeline_models::*;
pub use record_models::*;
pub use state_models::*;
