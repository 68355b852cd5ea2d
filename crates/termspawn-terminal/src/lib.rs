//! # termspawn-terminal
//!
//! Terminals and asynchronous spawning for termspawn.
//!
//! This crate provides:
//! - The spawn correlator mapping tokens to completion callbacks
//! - Spawn backends that report completion through a trampoline
//! - Terminals that own spawned children and their output
//! - A manager coordinating several terminals
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on termspawn-core
//! and termspawn-pty.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod correlator;
pub mod events;
pub mod manager;
pub mod output;
pub mod terminal;

// Re-export commonly used types
pub use backend::{ChildSink, PtyBackend, SpawnBackend, SpawnFn};
pub use correlator::{Completion, Correlator, PendingInfo, Trampoline};
pub use events::TerminalEvent;
pub use manager::TerminalManager;
pub use output::OutputBuffer;
pub use terminal::{SpawnRequest, Terminal};
