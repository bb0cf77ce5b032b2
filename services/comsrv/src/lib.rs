//! Edge Runtime Service (comsrv)
//!
//! Hosts the Modbus bridges of one edge device and drives them through
//! the read phase, the control window and the write phase once per cycle.

pub mod args;
pub mod config;
pub mod logging;
pub mod runtime;

pub use config::EdgeConfig;
pub use runtime::{Controller, EdgeRuntime};
