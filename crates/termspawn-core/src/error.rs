//! Error types for termspawn.

use thiserror::Error;

use crate::TerminalId;

/// Main error type for termspawn operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Every token in `1..=capacity` is held by a pending spawn
    #[error("Spawn token space exhausted ({capacity} tokens in use)")]
    TokenSpaceExhausted {
        /// Number of usable tokens
        capacity: u32,
    },

    /// The process-spawn facility reported a failure
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    /// The spawn did not complete within its timeout
    #[error("Spawn timed out after {0}ms")]
    SpawnTimeout(u64),

    /// PTY-related errors
    #[error("PTY error: {0}")]
    PtyError(String),

    /// Malformed spawn command (empty argv, missing program, ...)
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Color string could not be parsed
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// Palette does not have the required number of entries
    #[error("Invalid palette: need 16 colors, got {0}")]
    InvalidPalette(usize),

    /// Terminal not found
    #[error("Terminal not found: {0}")]
    TerminalNotFound(TerminalId),

    /// Terminal limit reached
    #[error("Terminal limit reached (max: {0})")]
    TerminalLimitReached(usize),

    /// Terminal already closed
    #[error("Terminal already closed")]
    TerminalClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input or parameters (generic)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
