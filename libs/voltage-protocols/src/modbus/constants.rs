//! Modbus protocol constants
//!
//! Register and coil limits are derived from the maximum PDU size of
//! 253 bytes (RS485 ADU of 256 bytes minus slave address and CRC).

// ============================================================================
// Frame Size Constants
// ============================================================================

/// MBAP header without the unit id
///
/// Format: Transaction ID(2) + Protocol ID(2) + Length(2). The unit id is
/// counted in the length field, together with the PDU.
pub const MBAP_HEADER_LEN: usize = 6;

/// Maximum PDU (Protocol Data Unit) size
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (Unit ID + PDU)
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Receive buffer size, larger than the biggest TCP or RTU frame
pub const MODBUS_RESPONSE_BUFFER_SIZE: usize = 512;

/// Minimum RTU frame: unit id, function code, CRC(2)
pub const RTU_MIN_FRAME_LEN: usize = 4;

/// Silence on the line that terminates an RTU frame
pub const RTU_INTER_BYTE_TIMEOUT_MS: u64 = 50;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// FC03/FC04: 1 + 1 + N * 2 <= 253
pub const MODBUS_MAX_READ_REGISTERS: usize = 125;

/// FC16: 1 + 2 + 2 + 1 + N * 2 <= 253
pub const MODBUS_MAX_WRITE_REGISTERS: usize = 123;

// ============================================================================
// Coil Operation Limits
// ============================================================================

/// FC01/FC02
pub const MODBUS_MAX_READ_COILS: usize = 2000;

/// FC15
pub const MODBUS_MAX_WRITE_COILS: usize = 1968;
