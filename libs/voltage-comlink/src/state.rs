//! Connection state of a physical link

use serde::Serialize;

/// Lifecycle state of one physical link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Never opened
    #[default]
    Uninitialized,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Connected,
    /// Lost or failed, will be reopened on the next transaction
    Disconnected,
    /// Closed explicitly, stays closed until reopened
    Closed,
}

impl ConnectionState {
    /// Check if state represents an active connection
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// A transaction may open the link lazily from this state
    pub fn can_open(&self) -> bool {
        matches!(
            self,
            ConnectionState::Uninitialized | ConnectionState::Disconnected
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Uninitialized => write!(f, "UNINITIALIZED"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Closed => write!(f, "CLOSED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Disconnected.can_open());
        assert!(!ConnectionState::Closed.can_open());
        assert_eq!(ConnectionState::Closed.to_string(), "CLOSED");
    }
}
