//! Bit-label lookup for status words
//!
//! Status and fault words carry one condition per bit. Their channels
//! define labels keyed by bit mask (1, 2, 4, ...); the active labels are
//! those whose mask bits are all set in the current value.

use std::collections::BTreeSet;

use parking_lot::RwLock;

use crate::channel::{Channel, ChannelAddress};
use crate::value::ChannelValue;

/// Anything that can report the labels of its currently set bits
pub trait BitLabelSource: Send + Sync {
    fn address(&self) -> &ChannelAddress;

    fn active_bit_labels(&self) -> Vec<String>;
}

impl<T: ChannelValue> BitLabelSource for Channel<T> {
    fn address(&self) -> &ChannelAddress {
        Channel::address(self)
    }

    fn active_bit_labels(&self) -> Vec<String> {
        let Some(value) = self.value().and_then(|v| v.label_key()) else {
            return Vec::new();
        };
        self.doc()
            .labels
            .iter()
            .filter(|(mask, _)| **mask != 0 && value & **mask == **mask)
            .map(|(_, label)| label.clone())
            .collect()
    }
}

/// Aggregate of several status-word channels, e.g. all warning words of
/// one inverter
#[derive(Default)]
pub struct StatusBitChannels {
    sources: RwLock<Vec<Box<dyn BitLabelSource>>>,
}

impl StatusBitChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<T: ChannelValue>(&self, channel: &Channel<T>) -> &Self {
        self.sources.write().push(Box::new(channel.clone()));
        self
    }

    /// Active labels across all channels, sorted and de-duplicated
    pub fn labels(&self) -> BTreeSet<String> {
        self.sources
            .read()
            .iter()
            .flat_map(|source| source.active_bit_labels())
            .collect()
    }

    pub fn is_clear(&self) -> bool {
        self.sources
            .read()
            .iter()
            .all(|source| source.active_bit_labels().is_empty())
    }
}
