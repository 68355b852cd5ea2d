//! Typed terminal events.

use serde::Serialize;

/// Something that happened to a terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TerminalEvent {
    /// An attached child process exited
    ChildExited {
        /// Process id, if known
        pid: Option<u32>,
        /// Exit code reported by the OS
        exit_code: u32,
    },
    /// The terminal was reset
    Reset {
        /// Tabstops were reset
        clear_tabstops: bool,
        /// Scrollback was cleared
        clear_history: bool,
    },
    /// The terminal was closed
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_exited_json() {
        let event = TerminalEvent::ChildExited {
            pid: Some(1234),
            exit_code: 0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"child_exited","pid":1234,"exit_code":0}"#);
    }

    #[test]
    fn test_closed_json() {
        let json = serde_json::to_string(&TerminalEvent::Closed).unwrap();
        assert_eq!(json, r#"{"event":"closed"}"#);
    }
}
