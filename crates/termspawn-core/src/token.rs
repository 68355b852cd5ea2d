//! Spawn correlation tokens.
//!
//! A token is the only thing that crosses the completion boundary between a
//! spawn backend and the correlator, so it is kept to a fixed-width integer.

use serde::{Deserialize, Serialize};

/// Integer type of the slot a completion trampoline carries.
pub type RawToken = u32;

/// Handle correlating a pending asynchronous spawn with its completion.
///
/// Raw value `0` is reserved: it means "no callback registered" and is also the
/// sentinel returned when the token space is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnToken(RawToken);

impl SpawnToken {
    /// The "no correlation" token.
    pub const NONE: SpawnToken = SpawnToken(0);

    /// Wrap a raw slot value.
    pub const fn from_raw(raw: RawToken) -> Self {
        Self(raw)
    }

    /// The raw slot value.
    pub const fn raw(self) -> RawToken {
        self.0
    }

    /// Whether this is the reserved zero token.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl Default for SpawnToken {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<RawToken> for SpawnToken {
    fn from(raw: RawToken) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for SpawnToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
