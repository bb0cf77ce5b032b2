//! Binary data processing utilities
//!
//! Provides byte/word order handling, bit extraction and packing,
//! and register ↔ numeric conversions for field protocols.
//!
//! # Design Principles
//!
//! - **Protocol-agnostic**: No function-code or framing logic
//! - **Type-safe**: `ByteOrder` enum prevents string typos
//! - **Total**: conversions never panic, short input is reported as `None`

pub mod bit_ops;
pub mod byte_order;
pub mod conversions;

pub use bit_ops::*;
pub use byte_order::ByteOrder;
pub use conversions::*;
