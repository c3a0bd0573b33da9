// src/exec/mod.rs

//! Process execution layer.
//!
//! Everything that touches a real child process lives here:
//!
//! - [`command`] turns a [`crate::unit::UnitDescriptor`] into a
//!   `tokio::process::Command` (arguments, cwd, resolved env, pipes).
//! - [`tree_kill`] isolates each child in its own process group and kills
//!   the whole tree on cancellation.
//! - [`pump`] reads stdout/stderr line by line without ever letting a child
//!   block on a full pipe.
//! - [`controller`] runs one attempt of one unit and publishes its state.

pub mod command;
pub mod controller;
pub mod pump;
pub mod tree_kill;

pub use command::build_command;
pub use controller::{AttemptResult, ProcessController};
pub use tree_kill::ProcessTree;
