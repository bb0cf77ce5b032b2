//! Channel error types
//!
//! Only write validation fails; an empty value is `None`, not an error.

use thiserror::Error;

use crate::channel::ChannelAddress;

/// Result type for channel write operations
pub type Result<T> = std::result::Result<T, WriteChannelError>;

/// Rejected write to a channel
///
/// Returned synchronously to the controller that called `push_write*`.
/// The channel's write state is left untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WriteChannelError {
    /// Value lies outside the effective write interval
    #[error("{channel}: value {value} outside of write interval [{min}, {max}]")]
    ValueOutOfRange {
        channel: ChannelAddress,
        value: String,
        min: String,
        max: String,
    },

    /// A different fixed value is already pending for this cycle
    #[error("{channel}: fixed value {pending} already pending, rejected {requested}")]
    ConflictingFixedValue {
        channel: ChannelAddress,
        pending: String,
        requested: String,
    },

    /// The channel was not built writable
    #[error("{0}: channel is not writable")]
    NotWritable(ChannelAddress),
}

impl WriteChannelError {
    pub fn channel(&self) -> &ChannelAddress {
        match self {
            WriteChannelError::ValueOutOfRange { channel, .. }
            | WriteChannelError::ConflictingFixedValue { channel, .. }
            | WriteChannelError::NotWritable(channel) => channel,
        }
    }
}

/// Registry errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("channel {0} is already registered")]
    Duplicate(ChannelAddress),
}
