//! VoltageEMS Protocol Engine
//!
//! Moves values between field devices and channels. Protocols are
//! feature-gated for selective compilation.
//!
//! # Features
//!
//! - `modbus` - Modbus TCP engine (elements, tasks, worker, bridge)
//! - `modbus-rtu` - Modbus RTU over serial lines
//!
//! # Architecture
//!
//! Device definitions describe their registers as elements bound to
//! channels, group them into tasks and hand the resulting protocol to a
//! bridge. The bridge owns one physical link and one worker; an external
//! scheduler drives the worker once per cycle.

#[cfg(feature = "modbus")]
pub mod modbus;

// Re-export common types for convenience
pub use voltage_comlink::{ByteOrder, ComLinkError, ConnectionState};
