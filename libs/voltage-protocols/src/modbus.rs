//! Modbus Protocol Engine
//!
//! Moves values between Modbus devices and channels once per cycle.
//!
//! # Architecture
//!
//! ```text
//! voltage-protocols/modbus
//!     ├── Converter        (element value <-> channel value)
//!     ├── ModbusElement    (register/coil span bound to channels)
//!     ├── RegisterRange    (contiguous elements)
//!     ├── Task             (one request per range, ONCE/LOW/HIGH)
//!     ├── ModbusProtocol   (read and write task managers of one unit)
//!     ├── ModbusWorker     (read phase, control window, write phase)
//!     ├── Bridge           (one link, many protocols)
//!     └── ModbusTransport  (LinkTransport over TCP or RTU)
//! ```
//!
//! # Example
//!
//! ```
//! use voltage_channel::Channel;
//! use voltage_protocols::modbus::{
//!     Converter, ModbusElement, ModbusProtocol, Priority, Task, UnsignedWordElement,
//! };
//!
//! let voltage: Channel<f64> = Channel::builder("meter0", "Voltage").unit("V").build();
//!
//! let protocol = ModbusProtocol::with_tasks(
//!     1,
//!     [Task::fc3_read_holding_registers(
//!         100,
//!         Priority::High,
//!         vec![UnsignedWordElement::new(100)
//!             .bind(&voltage, Converter::scale_pow10(-1))
//!             .boxed()],
//!     )],
//! )
//! .unwrap();
//! assert_eq!(protocol.read_task_count(), 1);
//! ```

mod bridge;
mod codec;
mod config;
mod connection;
mod constants;
mod converter;
mod element;
mod error;
mod frame;
mod pdu;
mod protocol;
mod range;
mod task;
mod task_manager;
mod transport;
mod worker;

pub use bridge::Bridge;
pub use codec::{ModbusRequest, ModbusResponse};
pub use config::{load_config_from_file, BridgeConfig, LinkConfig, ENV_PREFIX};
pub use connection::{ModbusConnection, ModbusConnectionManager};
pub use constants::{
    MAX_MBAP_LENGTH, MAX_PDU_SIZE, MBAP_HEADER_LEN, MODBUS_MAX_READ_COILS, MODBUS_MAX_READ_REGISTERS,
    MODBUS_MAX_WRITE_COILS, MODBUS_MAX_WRITE_REGISTERS, MODBUS_RESPONSE_BUFFER_SIZE,
};
pub use converter::Converter;
pub use element::{
    BitBinding, BitField, Binding, ChannelBinding, CoilElement, DummyElement, ElementData, ElementSpace,
    FloatDoublewordElement, FloatQuadwordElement, ModbusElement, ReadErrorCounter, RegisterElement, RegisterType,
    ResolvedChannels, SignedDoublewordElement, SignedQuadwordElement, SignedWordElement, StringElement,
    UnsignedDoublewordElement, UnsignedQuadwordElement, UnsignedWordElement, WriteData,
};
pub use error::{ConversionError, ModbusError, Result};
pub use frame::{build_rtu_frame, build_tcp_frame, crc16, exception_description, FrameMode, FrameProcessor, ParsedFrame};
pub use pdu::{function_code_description, FunctionCode, ModbusPdu, PduBuilder};
pub use protocol::ModbusProtocol;
pub use range::RegisterRange;
pub use task::{Priority, Task};
pub use task_manager::TaskManager;
pub use transport::{LinkTransport, ModbusTransport};
pub use worker::{LogVerbosity, ModbusWorker, WorkerDiagnostics, WorkerSettings, WorkerState};
