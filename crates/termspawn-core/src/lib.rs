//! # termspawn-core
//!
//! Core types for termspawn.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other termspawn crates. It provides:
//!
//! - Spawn tokens shared by the correlator and spawn backends
//! - Terminal identity, status and geometry
//! - Colors and palettes
//! - Configuration and error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other termspawn crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod geometry;
pub mod palette;
pub mod terminal;
pub mod token;

// Re-export commonly used types
pub use config::{Config, CorrelatorScope, GeneralSettings, SpawnSettings, TerminalSettings};
pub use error::{Error, Result};
pub use geometry::Dimensions;
pub use palette::{Color, Palette, PaletteColor, PALETTE_SIZE};
pub use terminal::{TerminalId, TerminalInfo, TerminalStatus};
pub use token::{RawToken, SpawnToken};
