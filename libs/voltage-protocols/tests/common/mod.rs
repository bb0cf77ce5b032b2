//! In-memory Modbus slave for worker tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use voltage_comlink::{ComLinkError, Result};
use voltage_protocols::modbus::{ModbusRequest, ModbusResponse, ModbusTransport};

/// Registers and coils default to zero / false
#[derive(Default)]
pub struct MemorySlave {
    registers: Mutex<BTreeMap<u16, u16>>,
    coils: Mutex<BTreeMap<u16, bool>>,
    offline: AtomicBool,
    log: Mutex<Vec<(u8, ModbusRequest)>>,
}

impl MemorySlave {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.registers.lock().insert(address, value);
    }

    pub fn register(&self, address: u16) -> u16 {
        self.registers.lock().get(&address).copied().unwrap_or(0)
    }

    pub fn set_coil(&self, address: u16, value: bool) {
        self.coils.lock().insert(address, value);
    }

    pub fn coil(&self, address: u16) -> bool {
        self.coils.lock().get(&address).copied().unwrap_or(false)
    }

    /// Every request times out while offline
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Requests received so far, with their unit id
    pub fn requests(&self) -> Vec<(u8, ModbusRequest)> {
        self.log.lock().clone()
    }

    pub fn clear_requests(&self) {
        self.log.lock().clear();
    }

    fn read_registers(&self, address: u16, quantity: u16) -> Vec<u16> {
        (0..quantity).map(|i| self.register(address + i)).collect()
    }

    fn read_coils(&self, address: u16, quantity: u16) -> Vec<bool> {
        (0..quantity).map(|i| self.coil(address + i)).collect()
    }
}

#[async_trait]
impl ModbusTransport for MemorySlave {
    async fn execute(&self, unit_id: u8, request: &ModbusRequest) -> Result<ModbusResponse> {
        self.log.lock().push((unit_id, request.clone()));
        if self.offline.load(Ordering::SeqCst) {
            return Err(ComLinkError::timeout("slave offline"));
        }

        let response = match request {
            ModbusRequest::ReadCoils { address, quantity }
            | ModbusRequest::ReadDiscreteInputs { address, quantity } => {
                ModbusResponse::Coils(self.read_coils(*address, *quantity))
            },
            ModbusRequest::ReadHoldingRegisters { address, quantity }
            | ModbusRequest::ReadInputRegisters { address, quantity } => {
                ModbusResponse::Registers(self.read_registers(*address, *quantity))
            },
            ModbusRequest::WriteSingleCoil { address, value } => {
                self.set_coil(*address, *value);
                ModbusResponse::Written
            },
            ModbusRequest::WriteSingleRegister { address, value } => {
                self.set_register(*address, *value);
                ModbusResponse::Written
            },
            ModbusRequest::WriteMultipleCoils { address, values } => {
                for (offset, value) in values.iter().enumerate() {
                    self.set_coil(*address + offset as u16, *value);
                }
                ModbusResponse::Written
            },
            ModbusRequest::WriteMultipleRegisters { address, values } => {
                for (offset, value) in values.iter().enumerate() {
                    self.set_register(*address + offset as u16, *value);
                }
                ModbusResponse::Written
            },
        };
        Ok(response)
    }
}
