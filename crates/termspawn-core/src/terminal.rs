//! Terminal identity and status types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Dimensions;

/// Unique identifier for a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerminalId(Uuid);

impl TerminalId {
    /// Create a new random terminal ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for TerminalId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TerminalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TerminalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStatus {
    /// No child attached
    Idle,
    /// At least one child is running
    Running,
    /// Terminal was closed
    Closed,
}

/// Snapshot of a terminal's state, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalInfo {
    /// Terminal identifier
    pub id: TerminalId,
    /// Current status
    pub status: TerminalStatus,
    /// Terminal dimensions
    pub dimensions: Dimensions,
    /// Process IDs of attached children
    pub children: Vec<u32>,
    /// Spawns still waiting for completion
    pub pending_spawns: usize,
}
