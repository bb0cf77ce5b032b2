//! Modbus framing for TCP (MBAP header) and RTU (CRC-16)
//!
//! One link carries one transaction at a time, so the processor tracks a
//! single pending request. A TCP response whose transaction id does not
//! match it belongs to an abandoned transaction and is reported as stale;
//! the caller drops it and keeps reading.

use tracing::{debug, trace};
use voltage_comlink::error::{ComLinkError, Result};

use super::constants::{MBAP_HEADER_LEN, RTU_MIN_FRAME_LEN};
use super::pdu::ModbusPdu;

/// Modbus framing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// TCP mode (MBAP header)
    Tcp,
    /// RTU mode (CRC check)
    Rtu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingRequest {
    transaction_id: u16,
    function_code: u8,
    unit_id: u8,
}

/// Result of parsing one received frame
#[derive(Debug, PartialEq)]
pub enum ParsedFrame {
    /// Response to the pending request
    Response { unit_id: u8, pdu: ModbusPdu },
    /// Late answer to an earlier, abandoned request
    Stale { transaction_id: u16 },
}

/// Builds request frames and validates responses against them
#[derive(Debug)]
pub struct FrameProcessor {
    mode: FrameMode,
    pending: Option<PendingRequest>,
    next_transaction_id: u16,
}

impl FrameProcessor {
    pub fn new(mode: FrameMode) -> Self {
        Self {
            mode,
            pending: None,
            next_transaction_id: 1,
        }
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// Next transaction id, wraps from 0xFFFF to 0x0000
    pub fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    /// Build a complete frame and remember it as the pending request
    pub fn build_frame(&mut self, unit_id: u8, pdu: &ModbusPdu) -> Vec<u8> {
        let function_code = pdu.function_code().unwrap_or(0);
        let transaction_id = match self.mode {
            FrameMode::Tcp => self.next_transaction_id(),
            FrameMode::Rtu => 0,
        };
        self.pending = Some(PendingRequest {
            transaction_id,
            function_code,
            unit_id,
        });

        match self.mode {
            FrameMode::Tcp => build_tcp_frame(transaction_id, unit_id, pdu),
            FrameMode::Rtu => build_rtu_frame(unit_id, pdu),
        }
    }

    /// Forget the pending request, e.g. after the link was dropped
    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn parse_frame(&mut self, data: &[u8]) -> Result<ParsedFrame> {
        match self.mode {
            FrameMode::Tcp => self.parse_tcp_frame(data),
            FrameMode::Rtu => self.parse_rtu_frame(data),
        }
    }

    fn pending(&self) -> Result<PendingRequest> {
        self.pending
            .ok_or_else(|| ComLinkError::protocol("Response received without pending request"))
    }

    fn parse_tcp_frame(&mut self, data: &[u8]) -> Result<ParsedFrame> {
        if data.len() < MBAP_HEADER_LEN + 2 {
            return Err(ComLinkError::protocol("TCP frame too short"));
        }

        let transaction_id = u16::from_be_bytes([data[0], data[1]]);
        let protocol_id = u16::from_be_bytes([data[2], data[3]]);
        let length = u16::from_be_bytes([data[4], data[5]]) as usize;
        let unit_id = data[MBAP_HEADER_LEN];

        trace!(
            "MBAP header: trans_id={:04X}, protocol_id={:04X}, length={}, unit_id={}",
            transaction_id,
            protocol_id,
            length,
            unit_id
        );

        if protocol_id != 0 {
            return Err(ComLinkError::Protocol(format!(
                "Invalid protocol ID: expected 0, got {protocol_id}"
            )));
        }
        if data.len() != MBAP_HEADER_LEN + length {
            return Err(ComLinkError::Protocol(format!(
                "Invalid TCP frame length: expected {}, got {}",
                MBAP_HEADER_LEN + length,
                data.len()
            )));
        }

        let pending = self.pending()?;
        if transaction_id != pending.transaction_id {
            debug!(
                "Discarding stale response: trans_id={:04X}, pending={:04X}",
                transaction_id, pending.transaction_id
            );
            return Ok(ParsedFrame::Stale { transaction_id });
        }

        let pdu = ModbusPdu::from_slice(&data[MBAP_HEADER_LEN + 1..])?;
        self.validate(pending, unit_id, &pdu)?;
        self.pending = None;
        Ok(ParsedFrame::Response { unit_id, pdu })
    }

    fn parse_rtu_frame(&mut self, data: &[u8]) -> Result<ParsedFrame> {
        if data.len() < RTU_MIN_FRAME_LEN {
            return Err(ComLinkError::protocol("RTU frame too short"));
        }

        let frame_len = data.len();
        let unit_id = data[0];
        let received_crc = u16::from_le_bytes([data[frame_len - 2], data[frame_len - 1]]);
        let calculated_crc = crc16(&data[..frame_len - 2]);
        if received_crc != calculated_crc {
            return Err(ComLinkError::Protocol(format!(
                "CRC mismatch: expected 0x{calculated_crc:04X}, got 0x{received_crc:04X}"
            )));
        }

        let pending = self.pending()?;
        let pdu = ModbusPdu::from_slice(&data[1..frame_len - 2])?;
        self.validate(pending, unit_id, &pdu)?;
        self.pending = None;
        Ok(ParsedFrame::Response { unit_id, pdu })
    }

    fn validate(&self, pending: PendingRequest, unit_id: u8, pdu: &ModbusPdu) -> Result<()> {
        let response_fc = pdu.function_code().map_or(0, |fc| fc & 0x7F);
        if unit_id != pending.unit_id || response_fc != pending.function_code {
            return Err(ComLinkError::Protocol(format!(
                "Response mismatch: expected unit {} FC {:02X}, got unit {} FC {:02X}",
                pending.unit_id, pending.function_code, unit_id, response_fc
            )));
        }
        Ok(())
    }
}

/// MBAP header + unit id + PDU
pub fn build_tcp_frame(transaction_id: u16, unit_id: u8, pdu: &ModbusPdu) -> Vec<u8> {
    let length = (pdu.len() + 1) as u16;
    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + 1 + pdu.len());
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.push(unit_id);
    frame.extend_from_slice(pdu.as_slice());
    frame
}

/// Unit id + PDU + CRC (little-endian)
pub fn build_rtu_frame(unit_id: u8, pdu: &ModbusPdu) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + pdu.len() + 2);
    frame.push(unit_id);
    frame.extend_from_slice(pdu.as_slice());
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// CRC-16/MODBUS
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Standard exception code description
pub fn exception_description(exception_code: u8) -> &'static str {
    match exception_code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x07 => "Negative Acknowledge",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}
