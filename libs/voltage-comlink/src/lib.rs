//! Voltage Communication Link Library
//!
//! Link-level primitives shared by the field protocols of the edge runtime.
//!
//! # Architecture
//!
//! This library provides:
//! - **Bytes Utilities**: Byte/word order handling, bit operations, register conversions
//! - **Errors**: `ComLinkError`, the taxonomy of transport failures
//! - **State**: `ConnectionState` of a physical link

pub mod bytes;
pub mod error;
pub mod state;

// Re-export core types
pub use bytes::ByteOrder;
pub use error::{ComLinkError, Result};
pub use state::ConnectionState;
