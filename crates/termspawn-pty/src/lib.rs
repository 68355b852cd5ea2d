//! # termspawn-pty
//!
//! Process-spawn facility for termspawn.
//!
//! This crate provides:
//! - `SpawnCommand`: argv, environment, working directory, flags and timeout
//!   for one child, and its marshaling into a native PTY command
//! - `PtyHandle`: lifecycle of a child running on its own PTY
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on termspawn-core and
//! knows nothing about terminals or correlation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod pty;

// Re-export commonly used types
pub use command::{SpawnCommand, SpawnFlags};
pub use pty::PtyHandle;
