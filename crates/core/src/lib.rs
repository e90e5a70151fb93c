//! # pr-core
//!
//! Production run controller for a single long-running data pipeline.
//!
//! This crate provides:
//! - The lifecycle state machine and its durable state record
//! - Durable source offset checkpointing
//! - Asynchronous snapshot capture against a live run
//! - The controller that starts, stops, supervises and recovers a run
//! - A pluggable execution engine with an in-process implementation
//! - The stage library and file-backed pipeline resolution
//! - Configuration loading from a project root
//!
//! ## Modules
//!
//! - [`controller`]: The production run controller
//! - [`state`]: Lifecycle state machine and state tracker
//! - [`offset`]: Offset tracker
//! - [`snapshot`]: Snapshot store and coordinator
//! - [`engine`]: Engine seam, runner handle and local engine
//! - [`stages`]: Stage traits, library and built-in stages
//! - [`resolve`]: Pipeline store and validation
//! - [`config`]: Configuration loading
//! - [`store`]: Atomic durable record files
//! - [`logging`]: Tracing subscriber setup

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod logging;
pub mod offset;
pub mod resolve;
pub mod snapshot;
pub mod stages;
pub mod state;
pub mod store;

pub use controller::ProductionRunController;
pub use error::{RunError, RunResult};
