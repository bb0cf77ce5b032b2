//! Explicit channel registry
//!
//! Components register their channels with a registry object that is
//! passed to whoever needs lookup by address (diagnostics, debug log,
//! remote inspection). There is no process-wide instance.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::channel::{Channel, ChannelAddress};
use crate::error::RegistryError;
use crate::value::ChannelValue;

/// Type-erased view of a channel
pub trait AnyChannel: Send + Sync {
    fn address(&self) -> &ChannelAddress;

    fn is_present(&self) -> bool;

    fn is_writable(&self) -> bool;

    /// Value with unit and label, `UNDEFINED` if unknown
    fn render(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

impl<T: ChannelValue> AnyChannel for Channel<T> {
    fn address(&self) -> &ChannelAddress {
        Channel::address(self)
    }

    fn is_present(&self) -> bool {
        Channel::is_present(self)
    }

    fn is_writable(&self) -> bool {
        Channel::is_writable(self)
    }

    fn render(&self) -> String {
        let Some(value) = self.value() else {
            return "UNDEFINED".to_string();
        };
        let mut text = value.to_string();
        if !self.unit().is_empty() {
            text.push(' ');
            text.push_str(self.unit());
        }
        if let Some(label) = self.label() {
            text.push_str(&format!(" ({label})"));
        }
        text
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Channels by address
#[derive(Default)]
pub struct ChannelRegistry {
    channels: DashMap<ChannelAddress, Arc<dyn AnyChannel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: ChannelValue>(&self, channel: &Channel<T>) -> Result<(), RegistryError> {
        let address = channel.address().clone();
        if self.channels.contains_key(&address) {
            return Err(RegistryError::Duplicate(address));
        }
        debug!("Registered channel {}", address);
        self.channels.insert(address, Arc::new(channel.clone()));
        Ok(())
    }

    pub fn unregister_component(&self, component_id: &str) -> usize {
        let before = self.channels.len();
        self.channels
            .retain(|address, _| address.component_id != component_id);
        before - self.channels.len()
    }

    pub fn get(&self, address: &ChannelAddress) -> Option<Arc<dyn AnyChannel>> {
        self.channels.get(address).map(|entry| Arc::clone(entry.value()))
    }

    /// Typed lookup; `None` if missing or registered with another type
    pub fn get_typed<T: ChannelValue>(&self, address: &ChannelAddress) -> Option<Channel<T>> {
        let channel = self.get(address)?;
        channel.as_any().downcast_ref::<Channel<T>>().cloned()
    }

    /// Addresses, sorted
    pub fn addresses(&self) -> Vec<ChannelAddress> {
        let mut addresses: Vec<ChannelAddress> =
            self.channels.iter().map(|entry| entry.key().clone()).collect();
        addresses.sort();
        addresses
    }

    /// `address: value` lines for one component, sorted by channel id
    pub fn describe_component(&self, component_id: &str) -> Vec<String> {
        self.addresses()
            .into_iter()
            .filter(|address| address.component_id == component_id)
            .filter_map(|address| {
                self.get(&address)
                    .map(|channel| format!("{}: {}", address, channel.render()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
