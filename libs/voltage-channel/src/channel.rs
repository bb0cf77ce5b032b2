//! Typed, observable value container
//!
//! A `Channel<T>` is a cheap, cloneable handle to one value slot owned by a
//! component. Every raw update passes ignore-check, then scaling, then
//! storage, then listeners. Write arbitration (see [`crate::write`]) is a
//! capability chosen at build time with [`ChannelBuilder::writable`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::interval::Interval;
use crate::listener::{isolate, ChangeListener, ListenerSet, UpdateListener};
use crate::scaling::Scaling;
use crate::value::ChannelValue;
use crate::write::WriteState;

// ============================================================================
// Address
// ============================================================================

/// Unique address of a channel: owning component plus channel id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChannelAddress {
    pub component_id: String,
    pub channel_id: String,
}

impl ChannelAddress {
    pub fn new(component_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.component_id, self.channel_id)
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Static description of a channel, fixed at build time
#[derive(Debug, Clone)]
pub struct ChannelDoc<T> {
    pub unit: String,
    /// Display labels keyed by value (or by bit mask for status words)
    pub labels: BTreeMap<i64, String>,
    pub scaling: Scaling,
    /// Raw value meaning "not available"; stored as `None`
    pub ignore: Option<T>,
    /// Plausible value range, also the static write interval
    pub interval: Interval<T>,
    pub do_not_persist: bool,
    pub required: bool,
}

impl<T> Default for ChannelDoc<T> {
    fn default() -> Self {
        Self {
            unit: String::new(),
            labels: BTreeMap::new(),
            scaling: Scaling::default(),
            ignore: None,
            interval: Interval::default(),
            do_not_persist: false,
            required: false,
        }
    }
}

// ============================================================================
// Channel
// ============================================================================

type UpdateFn<T> = dyn Fn(&Channel<T>, Option<&T>) + Send + Sync;
type ChangeFn<T> = dyn Fn(&Channel<T>, Option<&T>, Option<&T>) + Send + Sync;

pub(crate) struct ChannelInner<T: ChannelValue> {
    address: ChannelAddress,
    doc: ChannelDoc<T>,
    value: RwLock<Option<T>>,
    update_listeners: ListenerSet<UpdateFn<T>>,
    change_listeners: ListenerSet<ChangeFn<T>>,
    pub(crate) write: Option<WriteState<T>>,
}

/// Shared handle to a typed channel
pub struct Channel<T: ChannelValue> {
    pub(crate) inner: Arc<ChannelInner<T>>,
}

impl<T: ChannelValue> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ChannelValue> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("address", &self.inner.address)
            .field("value", &*self.inner.value.read())
            .field("writable", &self.inner.write.is_some())
            .finish()
    }
}

impl<T: ChannelValue> Channel<T> {
    /// Start building a channel
    pub fn builder(
        component_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> ChannelBuilder<T> {
        ChannelBuilder::new(ChannelAddress::new(component_id, channel_id))
    }

    /// Read-only channel without unit, labels or scaling
    pub fn new(component_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self::builder(component_id, channel_id).build()
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.inner.address
    }

    pub fn component_id(&self) -> &str {
        &self.inner.address.component_id
    }

    pub fn id(&self) -> &str {
        &self.inner.address.channel_id
    }

    pub fn doc(&self) -> &ChannelDoc<T> {
        &self.inner.doc
    }

    pub fn unit(&self) -> &str {
        &self.inner.doc.unit
    }

    /// Current value, `None` if unknown
    pub fn value(&self) -> Option<T> {
        self.inner.value.read().clone()
    }

    pub fn value_or(&self, default: T) -> T {
        self.value().unwrap_or(default)
    }

    pub fn is_present(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Label for the current value, if one is defined
    pub fn label(&self) -> Option<String> {
        let key = self.inner.value.read().as_ref()?.label_key()?;
        self.inner.doc.labels.get(&key).cloned()
    }

    /// Accept a raw value and notify listeners
    pub fn set_value(&self, raw: impl Into<Option<T>>) {
        self.update_value(raw, true);
    }

    /// Accept a raw value
    ///
    /// `None` and the ignore sentinel store `None`; everything else is
    /// scaled. Update listeners fire on every call with `trigger_events`,
    /// change listeners only when the stored value differs from before.
    pub fn update_value(&self, raw: impl Into<Option<T>>, trigger_events: bool) {
        let new = raw.into().and_then(|raw| self.accept_raw(raw));
        let old = std::mem::replace(&mut *self.inner.value.write(), new.clone());
        if trigger_events {
            self.fire(new.as_ref(), old.as_ref());
        }
    }

    /// Mark the value as unknown
    pub fn invalidate(&self) {
        self.update_value(None, true);
    }

    fn accept_raw(&self, raw: T) -> Option<T> {
        let doc = &self.inner.doc;
        if doc.ignore.as_ref() == Some(&raw) {
            return None;
        }
        let stored = match raw.clone().apply_scaling(&doc.scaling) {
            Some(stored) => stored,
            None => {
                warn!(
                    "{}: raw value {} not representable after scaling",
                    self.inner.address, raw
                );
                return None;
            },
        };
        if !doc.interval.is_unbounded() && !doc.interval.contains(&stored) {
            debug!(
                "{}: value {} outside of {}",
                self.inner.address, stored, doc.interval
            );
        }
        Some(stored)
    }

    fn fire(&self, new: Option<&T>, old: Option<&T>) {
        let address = &self.inner.address;
        for listener in self.inner.update_listeners.snapshot() {
            isolate(address, "update", || listener(self, new));
        }
        if new != old {
            for listener in self.inner.change_listeners.snapshot() {
                isolate(address, "change", || listener(self, new, old));
            }
        }
    }

    pub fn add_update_listener(&self, listener: UpdateListener<T>) -> &Self {
        self.inner.update_listeners.add(listener);
        self
    }

    pub fn remove_update_listener(&self, listener: &UpdateListener<T>) -> &Self {
        self.inner.update_listeners.remove(listener);
        self
    }

    pub fn add_change_listener(&self, listener: ChangeListener<T>) -> &Self {
        self.inner.change_listeners.add(listener);
        self
    }

    pub fn remove_change_listener(&self, listener: &ChangeListener<T>) -> &Self {
        self.inner.change_listeners.remove(listener);
        self
    }

    pub fn downgrade(&self) -> WeakChannel<T> {
        WeakChannel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Both handles refer to the same channel
    pub fn ptr_eq(&self, other: &Channel<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Non-owning handle, used by derived channels to watch upstream channels
pub struct WeakChannel<T: ChannelValue> {
    inner: Weak<ChannelInner<T>>,
}

impl<T: ChannelValue> Clone for WeakChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: ChannelValue> WeakChannel<T> {
    pub fn upgrade(&self) -> Option<Channel<T>> {
        self.inner.upgrade().map(|inner| Channel { inner })
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Fluent configuration of a channel's metadata and capabilities
pub struct ChannelBuilder<T: ChannelValue> {
    address: ChannelAddress,
    doc: ChannelDoc<T>,
    writable: bool,
    min_bound: Option<Channel<T>>,
    max_bound: Option<Channel<T>>,
}

impl<T: ChannelValue> ChannelBuilder<T> {
    fn new(address: ChannelAddress) -> Self {
        Self {
            address,
            doc: ChannelDoc::default(),
            writable: false,
            min_bound: None,
            max_bound: None,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.doc.unit = unit.into();
        self
    }

    pub fn label(mut self, key: i64, label: impl Into<String>) -> Self {
        self.doc.labels.insert(key, label.into());
        self
    }

    /// Power-of-ten scale applied to raw values
    pub fn multiplier(mut self, multiplier: i32) -> Self {
        self.doc.scaling.multiplier = multiplier;
        self
    }

    pub fn delta(mut self, delta: f64) -> Self {
        self.doc.scaling.delta = delta;
        self
    }

    pub fn negate(mut self) -> Self {
        self.doc.scaling.negate = true;
        self
    }

    pub fn ignore(mut self, sentinel: T) -> Self {
        self.doc.ignore = Some(sentinel);
        self
    }

    pub fn interval(mut self, min: Option<T>, max: Option<T>) -> Self {
        self.doc.interval = Interval::new(min, max);
        self
    }

    pub fn do_not_persist(mut self) -> Self {
        self.doc.do_not_persist = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.doc.required = true;
        self
    }

    /// Enable write arbitration
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    /// Take the dynamic lower write bound from another channel
    pub fn write_min_bound(mut self, channel: &Channel<T>) -> Self {
        self.writable = true;
        self.min_bound = Some(channel.clone());
        self
    }

    /// Take the dynamic upper write bound from another channel
    pub fn write_max_bound(mut self, channel: &Channel<T>) -> Self {
        self.writable = true;
        self.max_bound = Some(channel.clone());
        self
    }

    pub fn build(self) -> Channel<T> {
        let write = self
            .writable
            .then(|| WriteState::new(self.min_bound, self.max_bound));
        Channel {
            inner: Arc::new(ChannelInner {
                address: self.address,
                doc: self.doc,
                value: RwLock::new(None),
                update_listeners: ListenerSet::new(),
                change_listeners: ListenerSet::new(),
                write,
            }),
        }
    }
}
