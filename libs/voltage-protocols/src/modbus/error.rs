//! Modbus engine error types
//!
//! Definition errors are returned while a protocol is being built;
//! transport errors are recorded per task by the worker.

use thiserror::Error;
use voltage_comlink::ComLinkError;

use super::pdu::FunctionCode;

/// Result type for the Modbus engine
pub type Result<T> = std::result::Result<T, ModbusError>;

/// Converter failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    /// Backward path of a converter built with a forward function only
    #[error("converter is forward-only, cannot convert channel value to element value")]
    ForwardOnly,

    /// Value not representable in the target type
    #[error("value {0} is out of range for the target type")]
    OutOfRange(String),

    #[error("unsupported conversion: {0}")]
    Unsupported(String),
}

/// Modbus engine errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModbusError {
    /// First element does not start at the declared start address
    #[error("range starting at {start}: first element is at {actual}")]
    StartMismatch { start: u16, actual: u16 },

    /// Element begins before the previous one ended
    #[error("element at {address} overlaps previous element ending at {previous_end}")]
    Overlap { address: u16, previous_end: u32 },

    /// Missing addresses between two elements
    #[error("gap before element at {address}, expected {expected}; use a dummy element")]
    Gap { address: u16, expected: u32 },

    #[error("range starting at {0} has no elements")]
    EmptyRange(u16),

    #[error("range starting at {start} exceeds the address space")]
    AddressOverflow { start: u16 },

    #[error("{function}: {quantity} exceeds the limit of {limit}")]
    TooLarge {
        function: FunctionCode,
        quantity: usize,
        limit: usize,
    },

    #[error("{function} cannot carry {kind} element at {address}")]
    WrongElementKind {
        function: FunctionCode,
        kind: &'static str,
        address: u16,
    },

    #[error("bit {bit} is outside of a {width}-bit element")]
    InvalidBit { bit: u8, width: u32 },

    /// Response payload does not match the task
    #[error("response does not match task: {0}")]
    ResponseMismatch(String),

    #[error("element at {address}: {source}")]
    Conversion {
        address: u16,
        #[source]
        source: ConversionError,
    },

    #[error(transparent)]
    Transport(#[from] ComLinkError),
}

impl ModbusError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ModbusError::Transport(_))
    }
}
