//! Read and write tasks
//!
//! A task is one schedulable Modbus request over one contiguous range of
//! elements, tagged with a [`Priority`]. The function code decides whether
//! it is a read or a write task and which element space it may carry.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::codec::{ModbusRequest, ModbusResponse};
use super::constants::{
    MODBUS_MAX_READ_COILS, MODBUS_MAX_READ_REGISTERS, MODBUS_MAX_WRITE_COILS,
    MODBUS_MAX_WRITE_REGISTERS,
};
use super::element::{ElementData, ElementSpace, ModbusElement, ResolvedChannels, WriteData};
use super::error::{ModbusError, Result};
use super::pdu::FunctionCode;
use super::range::RegisterRange;

/// Scheduling class of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Runs until it succeeds once, e.g. serial number or firmware version
    Once,
    /// Round-robin, one low task per cycle
    Low,
    /// Every cycle
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Once => write!(f, "ONCE"),
            Priority::Low => write!(f, "LOW"),
            Priority::High => write!(f, "HIGH"),
        }
    }
}

pub struct Task {
    function: FunctionCode,
    priority: Priority,
    range: RegisterRange,
}

fn limit(function: FunctionCode) -> usize {
    match function {
        FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => MODBUS_MAX_READ_COILS,
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => MODBUS_MAX_READ_REGISTERS,
        FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => 1,
        FunctionCode::WriteMultipleCoils => MODBUS_MAX_WRITE_COILS,
        FunctionCode::WriteMultipleRegisters => MODBUS_MAX_WRITE_REGISTERS,
    }
}

impl Task {
    fn new(
        function: FunctionCode,
        priority: Priority,
        start: u16,
        elements: Vec<Box<dyn ModbusElement>>,
    ) -> Result<Self> {
        let range = RegisterRange::new(start, elements)?;

        let space = if function.is_bit_access() {
            ElementSpace::Coils
        } else {
            ElementSpace::Registers
        };
        if let Some(element) = range.elements().iter().find(|e| e.space() != space) {
            return Err(ModbusError::WrongElementKind {
                function,
                kind: element.kind(),
                address: element.address(),
            });
        }

        let limit = limit(function);
        if range.length() as usize > limit {
            return Err(ModbusError::TooLarge {
                function,
                quantity: range.length() as usize,
                limit,
            });
        }

        Ok(Self {
            function,
            priority,
            range,
        })
    }

    pub fn fc1_read_coils(start: u16, priority: Priority, elements: Vec<Box<dyn ModbusElement>>) -> Result<Self> {
        Self::new(FunctionCode::ReadCoils, priority, start, elements)
    }

    pub fn fc2_read_discrete_inputs(
        start: u16,
        priority: Priority,
        elements: Vec<Box<dyn ModbusElement>>,
    ) -> Result<Self> {
        Self::new(FunctionCode::ReadDiscreteInputs, priority, start, elements)
    }

    pub fn fc3_read_holding_registers(
        start: u16,
        priority: Priority,
        elements: Vec<Box<dyn ModbusElement>>,
    ) -> Result<Self> {
        Self::new(FunctionCode::ReadHoldingRegisters, priority, start, elements)
    }

    pub fn fc4_read_input_registers(
        start: u16,
        priority: Priority,
        elements: Vec<Box<dyn ModbusElement>>,
    ) -> Result<Self> {
        Self::new(FunctionCode::ReadInputRegisters, priority, start, elements)
    }

    pub fn fc5_write_coil(priority: Priority, element: Box<dyn ModbusElement>) -> Result<Self> {
        Self::new(FunctionCode::WriteSingleCoil, priority, element.address(), vec![element])
    }

    pub fn fc6_write_register(priority: Priority, element: Box<dyn ModbusElement>) -> Result<Self> {
        Self::new(FunctionCode::WriteSingleRegister, priority, element.address(), vec![element])
    }

    pub fn fc15_write_coils(start: u16, priority: Priority, elements: Vec<Box<dyn ModbusElement>>) -> Result<Self> {
        Self::new(FunctionCode::WriteMultipleCoils, priority, start, elements)
    }

    pub fn fc16_write_registers(
        start: u16,
        priority: Priority,
        elements: Vec<Box<dyn ModbusElement>>,
    ) -> Result<Self> {
        Self::new(FunctionCode::WriteMultipleRegisters, priority, start, elements)
    }

    pub fn function(&self) -> FunctionCode {
        self.function
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn is_read(&self) -> bool {
        self.function.is_read()
    }

    pub fn range(&self) -> &RegisterRange {
        &self.range
    }

    pub fn elements(&self) -> &[Box<dyn ModbusElement>] {
        self.range.elements()
    }

    /// Request for a read task, `None` for write tasks
    pub fn read_request(&self) -> Option<ModbusRequest> {
        let address = self.range.start();
        let quantity = self.range.length();
        match self.function {
            FunctionCode::ReadCoils => Some(ModbusRequest::ReadCoils { address, quantity }),
            FunctionCode::ReadDiscreteInputs => Some(ModbusRequest::ReadDiscreteInputs { address, quantity }),
            FunctionCode::ReadHoldingRegisters => Some(ModbusRequest::ReadHoldingRegisters { address, quantity }),
            FunctionCode::ReadInputRegisters => Some(ModbusRequest::ReadInputRegisters { address, quantity }),
            _ => None,
        }
    }

    /// Distribute a read response over the elements
    ///
    /// A response of the wrong shape or length is rejected before any
    /// element sees it.
    pub fn apply_response(&self, response: &ModbusResponse) -> Result<()> {
        let expected = self.range.length() as usize;
        let mut first_error = None;
        match response {
            ModbusResponse::Registers(values) if !self.function.is_bit_access() && values.len() == expected => {
                for element in self.elements() {
                    let offset = self.range.offset_of(element.as_ref());
                    let span = &values[offset..offset + element.length() as usize];
                    if let Err(e) = element.apply(ElementData::Registers(span)) {
                        warn!("{}: {}", self, e);
                        first_error.get_or_insert(e);
                    }
                }
            },
            ModbusResponse::Coils(values) if self.function.is_bit_access() && values.len() == expected => {
                for element in self.elements() {
                    let offset = self.range.offset_of(element.as_ref());
                    let span = &values[offset..offset + element.length() as usize];
                    if let Err(e) = element.apply(ElementData::Coils(span)) {
                        warn!("{}: {}", self, e);
                        first_error.get_or_insert(e);
                    }
                }
            },
            other => {
                return Err(ModbusError::ResponseMismatch(format!(
                    "{self} expected {expected} values, got {other:?}"
                )));
            },
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Count a failed read on every element and invalidate those that
    /// reached `threshold` consecutive failures. Returns the number of
    /// invalidated elements.
    pub fn record_read_failure(&self, threshold: u32) -> usize {
        let threshold = threshold.max(1);
        let mut invalidated = 0;
        for element in self.elements() {
            if element.read_errors().increment() >= threshold {
                element.invalidate();
                invalidated += 1;
            }
        }
        invalidated
    }

    pub fn record_read_success(&self) {
        for element in self.elements() {
            element.read_errors().reset();
        }
    }

    pub fn shadow_copy_and_reset(&self, resolved: &mut ResolvedChannels) {
        for element in self.elements() {
            element.shadow_copy_and_reset(resolved);
        }
    }

    /// Drop the shadow copies once the write phase is over
    pub fn discard_write(&self) {
        for element in self.elements() {
            element.discard_write();
        }
    }

    /// Requests for all pending element values
    ///
    /// Each run of consecutive pending elements becomes one request; an
    /// empty result means nothing is pending.
    pub fn write_requests(&self) -> Result<Vec<ModbusRequest>> {
        let mut pending = Vec::with_capacity(self.elements().len());
        let mut first_error = None;
        for element in self.elements() {
            match element.write_data() {
                Ok(data) => pending.push(data),
                Err(source) => {
                    first_error.get_or_insert(ModbusError::Conversion {
                        address: element.address(),
                        source,
                    });
                    pending.push(None);
                },
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut requests = Vec::new();
        let mut run: Option<(u16, Vec<u16>, Vec<bool>)> = None;
        for (element, data) in self.elements().iter().zip(pending) {
            match data {
                Some(data) => {
                    let (_, registers, coils) =
                        run.get_or_insert_with(|| (element.address(), Vec::new(), Vec::new()));
                    match data {
                        WriteData::Registers(values) => registers.extend(values),
                        WriteData::Coils(values) => coils.extend(values),
                    }
                },
                None => {
                    if let Some(run) = run.take() {
                        requests.push(self.write_request(run)?);
                    }
                },
            }
        }
        if let Some(run) = run.take() {
            requests.push(self.write_request(run)?);
        }
        Ok(requests)
    }

    fn write_request(&self, (address, registers, coils): (u16, Vec<u16>, Vec<bool>)) -> Result<ModbusRequest> {
        let request = match self.function {
            FunctionCode::WriteSingleCoil if registers.is_empty() && coils.len() == 1 => {
                ModbusRequest::WriteSingleCoil {
                    address,
                    value: coils[0],
                }
            },
            FunctionCode::WriteSingleRegister if coils.is_empty() && registers.len() == 1 => {
                ModbusRequest::WriteSingleRegister {
                    address,
                    value: registers[0],
                }
            },
            FunctionCode::WriteMultipleCoils if registers.is_empty() && !coils.is_empty() => {
                ModbusRequest::WriteMultipleCoils { address, values: coils }
            },
            FunctionCode::WriteMultipleRegisters if coils.is_empty() && !registers.is_empty() => {
                ModbusRequest::WriteMultipleRegisters {
                    address,
                    values: registers,
                }
            },
            _ => {
                return Err(ModbusError::ResponseMismatch(format!(
                    "{self}: encoded {} registers and {} coils at {address}",
                    registers.len(),
                    coils.len()
                )));
            },
        };
        Ok(request)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FC{} {} {}", self.function.code(), self.range, self.priority)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({self})")
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::modbus::converter::Converter;
    use crate::modbus::element::{
        CoilElement, DummyElement, SignedWordElement, UnsignedDoublewordElement, UnsignedWordElement,
    };
    use voltage_channel::Channel;

    fn writable(id: &str) -> Channel<u16> {
        Channel::builder("ess0", id).writable().build()
    }

    #[test]
    fn test_read_request_covers_range() {
        let task = Task::fc3_read_holding_registers(
            100,
            Priority::High,
            vec![
                UnsignedWordElement::new(100).boxed(),
                DummyElement::registers(101, 3).boxed(),
                UnsignedDoublewordElement::new(104).boxed(),
            ],
        )
        .unwrap();
        assert_eq!(
            task.read_request(),
            Some(ModbusRequest::ReadHoldingRegisters {
                address: 100,
                quantity: 6
            })
        );
        assert_eq!(task.to_string(), "FC3 [100-105] HIGH");
    }

    #[test]
    fn test_wrong_element_kind() {
        let result = Task::fc1_read_coils(0, Priority::Low, vec![UnsignedWordElement::new(0).boxed()]);
        assert!(matches!(
            result,
            Err(ModbusError::WrongElementKind {
                function: FunctionCode::ReadCoils,
                ..
            })
        ));
        let result = Task::fc4_read_input_registers(0, Priority::Low, vec![CoilElement::new(0).boxed()]);
        assert!(matches!(result, Err(ModbusError::WrongElementKind { .. })));
    }

    #[test]
    fn test_request_limits() {
        let too_many =
            Task::fc3_read_holding_registers(0, Priority::High, vec![DummyElement::registers(0, 126).boxed()]);
        assert!(matches!(
            too_many,
            Err(ModbusError::TooLarge {
                quantity: 126,
                limit: 125,
                ..
            })
        ));
        let wide_single = Task::fc6_write_register(Priority::High, UnsignedDoublewordElement::new(0).boxed());
        assert!(matches!(wide_single, Err(ModbusError::TooLarge { .. })));
        assert!(Task::fc16_write_registers(0, Priority::High, vec![DummyElement::registers(0, 124).boxed()]).is_err());
        assert!(Task::fc15_write_coils(0, Priority::High, vec![DummyElement::coils(0, 1968).boxed()]).is_ok());
    }

    #[test]
    fn test_apply_response() {
        let soc: Channel<u16> = Channel::new("ess0", "Soc");
        let power: Channel<i16> = Channel::new("ess0", "ActivePower");
        let task = Task::fc4_read_input_registers(
            0,
            Priority::High,
            vec![
                UnsignedWordElement::new(0).bind(&soc, Converter::identity()).boxed(),
                DummyElement::registers(1, 1).boxed(),
                SignedWordElement::new(2).bind(&power, Converter::identity()).boxed(),
            ],
        )
        .unwrap();

        task.apply_response(&ModbusResponse::Registers(vec![55, 0xFFFF, 0xFF38]))
            .unwrap();
        assert_eq!(soc.value(), Some(55));
        assert_eq!(power.value(), Some(-200));

        assert!(task
            .apply_response(&ModbusResponse::Registers(vec![56, 0]))
            .is_err());
        assert!(task.apply_response(&ModbusResponse::Coils(vec![true; 3])).is_err());
        assert_eq!(soc.value(), Some(55));
    }

    #[test]
    fn test_read_failure_threshold() {
        let soc: Channel<u16> = Channel::new("ess0", "Soc");
        let task = Task::fc3_read_holding_registers(
            0,
            Priority::High,
            vec![UnsignedWordElement::new(0).bind(&soc, Converter::identity()).boxed()],
        )
        .unwrap();
        soc.set_value(50);

        assert_eq!(task.record_read_failure(2), 0);
        assert_eq!(soc.value(), Some(50));
        assert_eq!(task.record_read_failure(2), 1);
        assert_eq!(soc.value(), None);

        task.record_read_success();
        soc.set_value(51);
        assert_eq!(task.record_read_failure(2), 0);
        assert_eq!(soc.value(), Some(51));
    }

    #[test]
    fn test_write_nothing_pending() {
        let setpoint = writable("SetPower");
        let task = Task::fc6_write_register(
            Priority::High,
            UnsignedWordElement::new(7).bind(&setpoint, Converter::identity()).boxed(),
        )
        .unwrap();
        task.shadow_copy_and_reset(&mut ResolvedChannels::new());
        assert!(task.write_requests().unwrap().is_empty());

        setpoint.push_write(9).unwrap();
        task.shadow_copy_and_reset(&mut ResolvedChannels::new());
        assert_eq!(
            task.write_requests().unwrap(),
            vec![ModbusRequest::WriteSingleRegister { address: 7, value: 9 }]
        );
    }

    #[test]
    fn test_write_splits_into_contiguous_runs() {
        let a = writable("A");
        let b = writable("B");
        let c = writable("C");
        let d = writable("D");
        let task = Task::fc16_write_registers(
            10,
            Priority::High,
            vec![
                UnsignedWordElement::new(10).bind(&a, Converter::identity()).boxed(),
                UnsignedWordElement::new(11).bind(&b, Converter::identity()).boxed(),
                UnsignedWordElement::new(12).bind(&c, Converter::identity()).boxed(),
                DummyElement::registers(13, 1).boxed(),
                UnsignedWordElement::new(14).bind(&d, Converter::identity()).boxed(),
            ],
        )
        .unwrap();

        a.push_write(1).unwrap();
        b.push_write(2).unwrap();
        d.push_write(4).unwrap();
        task.shadow_copy_and_reset(&mut ResolvedChannels::new());

        assert_eq!(
            task.write_requests().unwrap(),
            vec![
                ModbusRequest::WriteMultipleRegisters {
                    address: 10,
                    values: vec![1, 2]
                },
                ModbusRequest::WriteMultipleRegisters {
                    address: 14,
                    values: vec![4]
                },
            ]
        );
        task.discard_write();
        assert!(task.write_requests().unwrap().is_empty());
    }

    #[test]
    fn test_write_coils() {
        let first: Channel<bool> = Channel::builder("relay0", "Out1").writable().build();
        let second: Channel<bool> = Channel::builder("relay0", "Out2").writable().build();
        let task = Task::fc15_write_coils(
            0,
            Priority::High,
            vec![
                CoilElement::new(0).bind(&first, Converter::identity()).boxed(),
                CoilElement::new(1).bind(&second, Converter::identity()).boxed(),
            ],
        )
        .unwrap();
        first.push_write(true).unwrap();
        second.push_write(false).unwrap();
        task.shadow_copy_and_reset(&mut ResolvedChannels::new());
        assert_eq!(
            task.write_requests().unwrap(),
            vec![ModbusRequest::WriteMultipleCoils {
                address: 0,
                values: vec![true, false]
            }]
        );
    }

    #[test]
    fn test_write_conversion_error() {
        let flag: Channel<bool> = Channel::builder("relay0", "Flag").writable().build();
        let task = Task::fc6_write_register(
            Priority::High,
            UnsignedWordElement::new(3)
                .bind(&flag, Converter::forward_only(|raw: u16| Some(raw != 0)))
                .boxed(),
        )
        .unwrap();
        flag.push_write(true).unwrap();
        task.shadow_copy_and_reset(&mut ResolvedChannels::new());
        assert!(matches!(
            task.write_requests(),
            Err(ModbusError::Conversion { address: 3, .. })
        ));
    }
}
