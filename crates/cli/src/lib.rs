//! FourEyes CLI - command orchestration over a data directory
//!
//! This crate provides the `foureyes` binary and the commands it runs.

pub mod commands;
pub mod config;
pub mod context;

pub use config::GovernanceConfig;
pub use context::AppContext;
