//! Communication Link Error Types
//!
//! Transport-level failures of a physical link. These never reach control
//! code directly; the protocol engine records them per task and element.

use thiserror::Error;

/// Result type for voltage-comlink operations
pub type Result<T> = std::result::Result<T, ComLinkError>;

/// Communication link errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComLinkError {
    /// Protocol-level errors (malformed frame, unexpected function code)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The device answered with an exception response
    #[error("Modbus exception 0x{code:02X} for function 0x{function:02X}: {description}")]
    ModbusException {
        function: u8,
        code: u8,
        description: &'static str,
    },
}

impl From<std::io::Error> for ComLinkError {
    fn from(err: std::io::Error) -> Self {
        ComLinkError::Io(err.to_string())
    }
}

// Helper methods for creating errors
impl ComLinkError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        ComLinkError::Protocol(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        ComLinkError::Connection(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        ComLinkError::Io(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        ComLinkError::Timeout(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        ComLinkError::InvalidData(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ComLinkError::Config(msg.into())
    }

    /// Check if this error indicates a need for reconnection
    pub fn needs_reconnect(&self) -> bool {
        match self {
            ComLinkError::Io(msg) => {
                msg.contains("Broken pipe")
                    || msg.contains("Connection reset")
                    || msg.contains("Connection refused")
                    || msg.contains("Connection aborted")
                    || msg.contains("Network is unreachable")
                    || msg.contains("early eof")
            },
            ComLinkError::Connection(_) => true,
            ComLinkError::NotConnected => true,
            _ => false,
        }
    }

    /// The device answered, so the link itself is healthy
    pub fn is_device_exception(&self) -> bool {
        matches!(self, ComLinkError::ModbusException { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ComLinkError::Timeout(_))
    }
}
