//! Typed Modbus requests and their PDU encoding
//!
//! Requests are built by tasks, encoded to PDUs by the link transport and
//! matched against the response PDU. Device exception responses become
//! [`ComLinkError::ModbusException`].

use std::fmt;

use voltage_comlink::bytes::{pack_coils, unpack_coils};
use voltage_comlink::error::{ComLinkError, Result};

use super::constants::{
    MODBUS_MAX_READ_COILS, MODBUS_MAX_READ_REGISTERS, MODBUS_MAX_WRITE_COILS,
    MODBUS_MAX_WRITE_REGISTERS,
};
use super::frame::exception_description;
use super::pdu::{FunctionCode, ModbusPdu, PduBuilder};

/// One Modbus transaction request
#[derive(Debug, Clone, PartialEq)]
pub enum ModbusRequest {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, values: Vec<bool> },
    WriteMultipleRegisters { address: u16, values: Vec<u16> },
}

/// Decoded response payload
#[derive(Debug, Clone, PartialEq)]
pub enum ModbusResponse {
    Coils(Vec<bool>),
    Registers(Vec<u16>),
    /// Write acknowledged
    Written,
}

impl ModbusRequest {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils { .. } => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    pub fn address(&self) -> u16 {
        match self {
            Self::ReadCoils { address, .. }
            | Self::ReadDiscreteInputs { address, .. }
            | Self::ReadHoldingRegisters { address, .. }
            | Self::ReadInputRegisters { address, .. }
            | Self::WriteSingleCoil { address, .. }
            | Self::WriteSingleRegister { address, .. }
            | Self::WriteMultipleCoils { address, .. }
            | Self::WriteMultipleRegisters { address, .. } => *address,
        }
    }

    /// Number of coils or registers covered
    pub fn quantity(&self) -> usize {
        match self {
            Self::ReadCoils { quantity, .. }
            | Self::ReadDiscreteInputs { quantity, .. }
            | Self::ReadHoldingRegisters { quantity, .. }
            | Self::ReadInputRegisters { quantity, .. } => *quantity as usize,
            Self::WriteSingleCoil { .. } | Self::WriteSingleRegister { .. } => 1,
            Self::WriteMultipleCoils { values, .. } => values.len(),
            Self::WriteMultipleRegisters { values, .. } => values.len(),
        }
    }

    /// Encode to a request PDU, enforcing the protocol quantity limits
    pub fn encode(&self) -> Result<ModbusPdu> {
        let fc = self.function_code();
        match self {
            Self::ReadCoils { address, quantity } | Self::ReadDiscreteInputs { address, quantity } => {
                check_quantity(fc, *quantity as usize, MODBUS_MAX_READ_COILS)?;
                PduBuilder::build_read_request(fc, *address, *quantity)
            },
            Self::ReadHoldingRegisters { address, quantity }
            | Self::ReadInputRegisters { address, quantity } => {
                check_quantity(fc, *quantity as usize, MODBUS_MAX_READ_REGISTERS)?;
                PduBuilder::build_read_request(fc, *address, *quantity)
            },
            Self::WriteSingleCoil { address, value } => {
                // FC05 value is 0xFF00 for ON, 0x0000 for OFF
                Ok(PduBuilder::new()
                    .function_code(fc)?
                    .address(*address)?
                    .word(if *value { 0xFF00 } else { 0x0000 })?
                    .build())
            },
            Self::WriteSingleRegister { address, value } => Ok(PduBuilder::new()
                .function_code(fc)?
                .address(*address)?
                .word(*value)?
                .build()),
            Self::WriteMultipleCoils { address, values } => {
                check_quantity(fc, values.len(), MODBUS_MAX_WRITE_COILS)?;
                let packed = pack_coils(values);
                Ok(PduBuilder::new()
                    .function_code(fc)?
                    .address(*address)?
                    .quantity(values.len() as u16)?
                    .byte(packed.len() as u8)?
                    .data(&packed)?
                    .build())
            },
            Self::WriteMultipleRegisters { address, values } => {
                check_quantity(fc, values.len(), MODBUS_MAX_WRITE_REGISTERS)?;
                let mut builder = PduBuilder::new()
                    .function_code(fc)?
                    .address(*address)?
                    .quantity(values.len() as u16)?
                    .byte((values.len() * 2) as u8)?;
                for value in values {
                    builder = builder.word(*value)?;
                }
                Ok(builder.build())
            },
        }
    }

    /// Decode the response PDU to this request
    pub fn decode_response(&self, pdu: &ModbusPdu) -> Result<ModbusResponse> {
        let expected = self.function_code().code();
        let Some(fc) = pdu.function_code() else {
            return Err(ComLinkError::protocol("Empty response PDU"));
        };

        if pdu.is_exception() {
            let code = pdu.exception_code().unwrap_or(0);
            return Err(ComLinkError::ModbusException {
                function: fc & 0x7F,
                code,
                description: exception_description(code),
            });
        }
        if fc != expected {
            return Err(ComLinkError::Protocol(format!(
                "Function code mismatch: expected {expected:02X}, got {fc:02X}"
            )));
        }

        let data = pdu.data();
        match self {
            Self::ReadCoils { quantity, .. } | Self::ReadDiscreteInputs { quantity, .. } => {
                let bytes = counted_payload(data, (*quantity as usize).div_ceil(8))?;
                unpack_coils(bytes, *quantity as usize)
                    .map(ModbusResponse::Coils)
                    .ok_or_else(|| ComLinkError::invalid_data("Coil payload too short"))
            },
            Self::ReadHoldingRegisters { quantity, .. } | Self::ReadInputRegisters { quantity, .. } => {
                let bytes = counted_payload(data, *quantity as usize * 2)?;
                Ok(ModbusResponse::Registers(
                    bytes
                        .chunks_exact(2)
                        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                        .collect(),
                ))
            },
            _ => {
                // Write responses echo address and value/quantity
                if data.len() < 4 {
                    return Err(ComLinkError::Protocol(format!(
                        "Write response too short: {} bytes",
                        data.len()
                    )));
                }
                let address = u16::from_be_bytes([data[0], data[1]]);
                if address != self.address() {
                    return Err(ComLinkError::Protocol(format!(
                        "Write response address mismatch: expected {}, got {address}",
                        self.address()
                    )));
                }
                Ok(ModbusResponse::Written)
            },
        }
    }
}

impl fmt::Display for ModbusRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let address = self.address();
        let quantity = self.quantity();
        write!(
            f,
            "FC{} {}-{}",
            self.function_code().code(),
            address,
            address as usize + quantity.saturating_sub(1)
        )
    }
}

fn check_quantity(fc: FunctionCode, quantity: usize, limit: usize) -> Result<()> {
    if quantity == 0 || quantity > limit {
        return Err(ComLinkError::Protocol(format!(
            "{fc}: quantity {quantity} outside 1..={limit}"
        )));
    }
    Ok(())
}

/// Payload after the byte-count field, checked against the expected size
fn counted_payload(data: &[u8], expected: usize) -> Result<&[u8]> {
    let Some((&count, payload)) = data.split_first() else {
        return Err(ComLinkError::protocol("Response without byte count"));
    };
    if count as usize != expected || payload.len() != expected {
        return Err(ComLinkError::Protocol(format!(
            "Byte count mismatch: expected {expected}, header {count}, payload {}",
            payload.len()
        )));
    }
    Ok(payload)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn pdu(bytes: &[u8]) -> ModbusPdu {
        ModbusPdu::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_encode_write_single_coil() {
        let on = ModbusRequest::WriteSingleCoil { address: 0x00AC, value: true };
        assert_eq!(on.encode().unwrap().as_slice(), &[0x05, 0x00, 0xAC, 0xFF, 0x00]);
        let off = ModbusRequest::WriteSingleCoil { address: 0x00AC, value: false };
        assert_eq!(off.encode().unwrap().as_slice(), &[0x05, 0x00, 0xAC, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_write_multiple_coils() {
        let request = ModbusRequest::WriteMultipleCoils {
            address: 0x0013,
            values: vec![true, false, true, true, false, false, true, true, true, false],
        };
        assert_eq!(
            request.encode().unwrap().as_slice(),
            &[0x0F, 0x00, 0x13, 0x00, 0x0A, 0x02, 0xCD, 0x01]
        );
    }

    #[test]
    fn test_encode_write_multiple_registers() {
        let request = ModbusRequest::WriteMultipleRegisters {
            address: 0x0001,
            values: vec![0x000A, 0x0102],
        };
        assert_eq!(
            request.encode().unwrap().as_slice(),
            &[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]
        );
    }

    #[test]
    fn test_encode_rejects_oversized_requests() {
        let read = ModbusRequest::ReadHoldingRegisters { address: 0, quantity: 126 };
        assert!(read.encode().is_err());
        let empty = ModbusRequest::WriteMultipleRegisters { address: 0, values: vec![] };
        assert!(empty.encode().is_err());
        let coils = ModbusRequest::WriteMultipleCoils { address: 0, values: vec![true; 1969] };
        assert!(coils.encode().is_err());
    }

    #[test]
    fn test_decode_registers() {
        let request = ModbusRequest::ReadHoldingRegisters { address: 0x006B, quantity: 3 };
        let response = request
            .decode_response(&pdu(&[0x03, 0x06, 0x02, 0x2B, 0x00, 0x00, 0x00, 0x64]))
            .unwrap();
        assert_eq!(response, ModbusResponse::Registers(vec![0x022B, 0x0000, 0x0064]));
    }

    #[test]
    fn test_decode_coils() {
        let request = ModbusRequest::ReadCoils { address: 0x0013, quantity: 10 };
        let response = request.decode_response(&pdu(&[0x01, 0x02, 0xCD, 0x01])).unwrap();
        assert_eq!(
            response,
            ModbusResponse::Coils(vec![true, false, true, true, false, false, true, true, true, false])
        );
    }

    #[test]
    fn test_decode_byte_count_mismatch() {
        let request = ModbusRequest::ReadInputRegisters { address: 0, quantity: 2 };
        assert!(request.decode_response(&pdu(&[0x04, 0x02, 0x00, 0x01])).is_err());
        assert!(request
            .decode_response(&pdu(&[0x04, 0x04, 0x00, 0x01, 0x00]))
            .is_err());
    }

    #[test]
    fn test_decode_exception() {
        let request = ModbusRequest::ReadHoldingRegisters { address: 0, quantity: 1 };
        let err = request.decode_response(&pdu(&[0x83, 0x02])).unwrap_err();
        assert_eq!(
            err,
            ComLinkError::ModbusException {
                function: 0x03,
                code: 0x02,
                description: "Illegal Data Address",
            }
        );
        assert!(err.is_device_exception());
    }

    #[test]
    fn test_decode_function_mismatch() {
        let request = ModbusRequest::ReadHoldingRegisters { address: 0, quantity: 1 };
        assert!(matches!(
            request.decode_response(&pdu(&[0x04, 0x02, 0x00, 0x01])),
            Err(ComLinkError::Protocol(_))
        ));
        assert!(request.decode_response(&ModbusPdu::new()).is_err());
    }

    #[test]
    fn test_decode_write_echo() {
        let request = ModbusRequest::WriteSingleRegister { address: 0x0001, value: 0x0003 };
        assert_eq!(
            request
                .decode_response(&pdu(&[0x06, 0x00, 0x01, 0x00, 0x03]))
                .unwrap(),
            ModbusResponse::Written
        );
        assert!(request
            .decode_response(&pdu(&[0x06, 0x00, 0x02, 0x00, 0x03]))
            .is_err());
    }

    #[test]
    fn test_request_display() {
        let request = ModbusRequest::ReadHoldingRegisters { address: 100, quantity: 10 };
        assert_eq!(request.to_string(), "FC3 100-109");
    }
}
