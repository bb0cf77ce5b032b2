//! Voltage Channel Library
//!
//! Typed, observable values exchanged between field protocols and control
//! logic of the edge runtime.
//!
//! # Architecture
//!
//! - **Channel**: `Channel<T>` value slot with unit, labels and scaling
//! - **Listeners**: update listeners (every accepted value) and change
//!   listeners (value differs from before), safe to modify while firing
//! - **Write arbitration**: fixed value and interval pushed by many
//!   controllers, resolved once per cycle into a shadow copy
//! - **Derived channels**: values computed from upstream channels
//! - **Status bits**: label lookup by bit mask
//! - **Registry**: explicit lookup by address
//!
//! # Example
//!
//! ```
//! use voltage_channel::Channel;
//!
//! let set_power = Channel::<i32>::builder("ess0", "SetActivePower")
//!     .unit("W")
//!     .interval(Some(-5000), Some(5000))
//!     .writable()
//!     .build();
//!
//! set_power.push_write_max(3000).unwrap();
//! assert!(set_power.push_write(4000).is_err());
//! set_power.push_write(2500).unwrap();
//!
//! set_power.shadow_copy_and_reset();
//! assert_eq!(set_power.write_shadow_copy(), Some(2500));
//! ```

pub mod channel;
pub mod derived;
pub mod error;
pub mod interval;
pub mod listener;
pub mod registry;
pub mod scaling;
pub mod status;
pub mod value;
pub mod write;

pub use channel::{Channel, ChannelAddress, ChannelBuilder, ChannelDoc, WeakChannel};
pub use derived::DerivedChannel;
pub use error::{RegistryError, Result, WriteChannelError};
pub use interval::Interval;
pub use listener::{ChangeListener, UpdateListener};
pub use registry::{AnyChannel, ChannelRegistry};
pub use scaling::{scale_pow10, Scaling};
pub use status::{BitLabelSource, StatusBitChannels};
pub use value::{ChannelValue, Numeric};
