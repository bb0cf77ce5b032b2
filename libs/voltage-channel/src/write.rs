//! Multi-writer arbitration for writable channels
//!
//! During the control window any number of controllers may push a fixed
//! value and/or narrow the write interval of a channel. Conflicts are
//! rejected at the call site. Once per cycle the engine calls
//! [`Channel::shadow_copy_and_reset`], which resolves one value, converts
//! it back to raw device units and parks it in the shadow slot until the
//! physical write consumes it with [`Channel::write_shadow_copy`].

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::channel::Channel;
use crate::error::{Result, WriteChannelError};
use crate::interval::Interval;
use crate::value::ChannelValue;

pub(crate) struct WriteState<T: ChannelValue> {
    pending: Mutex<PendingWrite<T>>,
    shadow: Mutex<Option<T>>,
    min_bound: Option<Channel<T>>,
    max_bound: Option<Channel<T>>,
}

struct PendingWrite<T> {
    fixed: Option<T>,
    interval: Interval<T>,
}

impl<T> Default for PendingWrite<T> {
    fn default() -> Self {
        Self {
            fixed: None,
            interval: Interval::default(),
        }
    }
}

impl<T: ChannelValue> WriteState<T> {
    pub(crate) fn new(min_bound: Option<Channel<T>>, max_bound: Option<Channel<T>>) -> Self {
        Self {
            pending: Mutex::new(PendingWrite::default()),
            shadow: Mutex::new(None),
            min_bound,
            max_bound,
        }
    }
}

fn render<T: ChannelValue>(bound: &Option<T>, unbounded: &str) -> String {
    bound
        .as_ref()
        .map_or_else(|| unbounded.to_string(), ToString::to_string)
}

impl<T: ChannelValue> Channel<T> {
    pub fn is_writable(&self) -> bool {
        self.inner.write.is_some()
    }

    fn write_state(&self) -> Result<&WriteState<T>> {
        self.inner
            .write
            .as_ref()
            .ok_or_else(|| WriteChannelError::NotWritable(self.address().clone()))
    }

    /// Tightest of static interval, pushed interval and bound channels
    ///
    /// A bound channel whose current value is exactly zero does not limit
    /// the interval. Kept as observed in the field, unconfirmed.
    fn effective_interval(&self, state: &WriteState<T>, pending: &PendingWrite<T>) -> Interval<T> {
        let mut interval = self.doc().interval.intersect(&pending.interval);
        if let Some(min) = state.min_bound.as_ref().and_then(Channel::value) {
            if !min.is_zero() {
                interval.narrow_min(min);
            }
        }
        if let Some(max) = state.max_bound.as_ref().and_then(Channel::value) {
            if !max.is_zero() {
                interval.narrow_max(max);
            }
        }
        interval
    }

    /// Effective write interval for the current cycle
    ///
    /// Unbounded for read-only channels.
    pub fn write_interval(&self) -> Interval<T> {
        match &self.inner.write {
            Some(state) => {
                let pending = state.pending.lock();
                self.effective_interval(state, &pending)
            },
            None => Interval::default(),
        }
    }

    /// Request a fixed value for this cycle
    ///
    /// Fails if a different fixed value is already pending or if `value`
    /// lies outside the effective interval.
    pub fn push_write(&self, value: T) -> Result<()> {
        let state = self.write_state()?;
        let mut pending = state.pending.lock();
        if let Some(fixed) = &pending.fixed {
            if *fixed != value {
                return Err(WriteChannelError::ConflictingFixedValue {
                    channel: self.address().clone(),
                    pending: fixed.to_string(),
                    requested: value.to_string(),
                });
            }
        }
        let interval = self.effective_interval(state, &pending);
        if !interval.contains(&value) {
            return Err(WriteChannelError::ValueOutOfRange {
                channel: self.address().clone(),
                value: value.to_string(),
                min: render(&interval.min, "-inf"),
                max: render(&interval.max, "+inf"),
            });
        }
        trace!("{}: push write {}", self.address(), value);
        pending.fixed = Some(value);
        Ok(())
    }

    /// Raise the lower write bound for this cycle
    ///
    /// Keeps the tighter of existing and new bound. Fails only if the new
    /// bound would exclude an already pending fixed value.
    pub fn push_write_min(&self, value: T) -> Result<()> {
        let state = self.write_state()?;
        let mut pending = state.pending.lock();
        if let Some(fixed) = &pending.fixed {
            if *fixed < value {
                return Err(WriteChannelError::ConflictingFixedValue {
                    channel: self.address().clone(),
                    pending: fixed.to_string(),
                    requested: format!("min {value}"),
                });
            }
        }
        trace!("{}: push write min {}", self.address(), value);
        pending.interval.narrow_min(value);
        Ok(())
    }

    /// Lower the upper write bound for this cycle
    ///
    /// Keeps the tighter of existing and new bound. Fails only if the new
    /// bound would exclude an already pending fixed value.
    pub fn push_write_max(&self, value: T) -> Result<()> {
        let state = self.write_state()?;
        let mut pending = state.pending.lock();
        if let Some(fixed) = &pending.fixed {
            if *fixed > value {
                return Err(WriteChannelError::ConflictingFixedValue {
                    channel: self.address().clone(),
                    pending: fixed.to_string(),
                    requested: format!("max {value}"),
                });
            }
        }
        trace!("{}: push write max {}", self.address(), value);
        pending.interval.narrow_max(value);
        Ok(())
    }

    fn resolve(&self, state: &WriteState<T>, pending: &PendingWrite<T>) -> Option<T> {
        let interval = self.effective_interval(state, pending);
        if interval.is_empty() {
            if pending.fixed.is_some() || !pending.interval.is_unbounded() {
                warn!(
                    "{}: write interval {} is empty, nothing will be written",
                    self.address(),
                    interval
                );
            }
            return None;
        }
        match &pending.fixed {
            Some(fixed) if interval.contains(fixed) => Some(fixed.clone()),
            Some(fixed) => {
                warn!(
                    "{}: fixed value {} left write interval {}",
                    self.address(),
                    fixed,
                    interval
                );
                None
            },
            None if pending.interval.is_unbounded() => None,
            None => interval.resolve(),
        }
    }

    /// Value the next shadow copy would hold, in channel units
    pub fn peek_write(&self) -> Option<T> {
        let state = self.inner.write.as_ref()?;
        let pending = state.pending.lock();
        self.resolve(state, &pending)
    }

    /// Resolve this cycle's writes into the shadow slot and reset them
    ///
    /// Safe to call when nothing was pushed; the shadow slot then ends up
    /// empty and the physical write is skipped.
    pub fn shadow_copy_and_reset(&self) {
        let Some(state) = self.inner.write.as_ref() else {
            return;
        };
        let resolved = {
            let mut pending = state.pending.lock();
            let resolved = self.resolve(state, &pending);
            *pending = PendingWrite::default();
            resolved
        };
        let raw = resolved.and_then(|value| {
            let raw = value.clone().remove_scaling(&self.doc().scaling);
            if raw.is_none() {
                warn!(
                    "{}: value {} not representable in device units",
                    self.address(),
                    value
                );
            }
            raw
        });
        if let Some(raw) = &raw {
            trace!("{}: shadow copy {}", self.address(), raw);
        }
        *state.shadow.lock() = raw;
    }

    /// Take the shadow copy; a second call returns `None`
    pub fn write_shadow_copy(&self) -> Option<T> {
        self.inner.write.as_ref()?.shadow.lock().take()
    }

    /// Shadow copy without consuming it
    pub fn shadow_copy(&self) -> Option<T> {
        self.inner.write.as_ref()?.shadow.lock().clone()
    }

    pub fn has_shadow_copy(&self) -> bool {
        self.inner
            .write
            .as_ref()
            .is_some_and(|state| state.shadow.lock().is_some())
    }
}
