//! Chatlink CLI library
//!
//! Operator commands for checking session configuration and inspecting the
//! local contact cache snapshots a session writes.

pub mod cli;
pub mod commands;

pub use cli::{CacheKind, Cli, Commands, SnapshotArgs};
pub use commands::CommandDispatcher;
