use std::fmt;

/// Lifecycle of the supervised connection.
///
/// ```text
///        start()              ready
/// Idle ─────────→ Connecting ──────→ Connected
///  ↑                  │ fail            │ lost (subscribers remain)
///  └──────────────────┘                 ▼
///  ↑          stop() / last close   Reconnecting ──(retry)──→ Connected
///  └─────────────────────────────────────┘
///
/// any ──dispose()──→ Disposed   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disposed,
}

impl ConnectionState {
    /// Returns `true` for the terminal state.
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Disposed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disposed => "disposed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal_only_disposed() {
        assert!(ConnectionState::Disposed.is_terminal());
        assert!(!ConnectionState::Reconnecting.is_terminal());
        assert!(!ConnectionState::Idle.is_terminal());
    }

    #[test]
    fn test_display_lowercase() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
