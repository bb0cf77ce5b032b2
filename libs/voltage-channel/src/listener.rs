//! Listener sets with copy-on-iterate semantics
//!
//! Listeners may be added or removed from any thread, including from
//! inside a listener that is currently firing. Firing works on a
//! snapshot, so a change takes effect with the next update.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::channel::{Channel, ChannelAddress};

/// Called on every accepted update, with the new value
pub type UpdateListener<T> = Arc<dyn Fn(&Channel<T>, Option<&T>) + Send + Sync>;

/// Called when the value changed, with the new and the old value
pub type ChangeListener<T> = Arc<dyn Fn(&Channel<T>, Option<&T>, Option<&T>) + Send + Sync>;

pub(crate) struct ListenerSet<L: ?Sized> {
    listeners: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> ListenerSet<L> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, listener: Arc<L>) {
        self.listeners.write().push(listener);
    }

    /// Remove by identity; returns whether the listener was registered
    pub(crate) fn remove(&self, listener: &Arc<L>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners.read().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }
}

/// Run one listener, containing a panic so the remaining listeners run
pub(crate) fn isolate(address: &ChannelAddress, kind: &str, call: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(call)) {
        error!(
            "{}: {} listener panicked: {}",
            address,
            kind,
            panic_message(panic.as_ref())
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
