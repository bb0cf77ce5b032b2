//! Channels whose value is computed from other channels
//!
//! A `DerivedChannel` is a node in the channel dependency graph: a target
//! channel, the upstream channels it depends on, and a function from the
//! upstream values to the target value. The target is recomputed after
//! every upstream update. Upstream channels are held weakly, so the
//! listener installed on them keeps nothing alive.

use std::sync::Arc;

use crate::channel::{Channel, WeakChannel};
use crate::listener::UpdateListener;
use crate::value::ChannelValue;

type DeriveFn<U, T> = dyn Fn(&[Option<U>]) -> Option<T> + Send + Sync;

pub struct DerivedChannel<U: ChannelValue, T: ChannelValue> {
    target: Channel<T>,
    upstream: Vec<Channel<U>>,
    listener: UpdateListener<U>,
}

fn recompute<U: ChannelValue, T: ChannelValue>(
    target: &Channel<T>,
    upstream: &[WeakChannel<U>],
    function: &DeriveFn<U, T>,
) {
    let values: Vec<Option<U>> = upstream
        .iter()
        .map(|weak| weak.upgrade().and_then(|channel| channel.value()))
        .collect();
    target.set_value(function(&values));
}

impl<U: ChannelValue, T: ChannelValue> DerivedChannel<U, T> {
    /// Wire `target` to `upstream` and compute the initial value
    ///
    /// `function` receives the upstream values in the given order.
    pub fn new<F>(target: Channel<T>, upstream: Vec<Channel<U>>, function: F) -> Self
    where
        F: Fn(&[Option<U>]) -> Option<T> + Send + Sync + 'static,
    {
        let function: Arc<DeriveFn<U, T>> = Arc::new(function);
        let weak_upstream: Vec<WeakChannel<U>> = upstream.iter().map(Channel::downgrade).collect();

        let listener_target = target.clone();
        let listener_upstream = weak_upstream.clone();
        let listener_function = Arc::clone(&function);
        let listener: UpdateListener<U> = Arc::new(move |_, _| {
            recompute(&listener_target, &listener_upstream, listener_function.as_ref());
        });

        for channel in &upstream {
            channel.add_update_listener(Arc::clone(&listener));
        }
        recompute(&target, &weak_upstream, function.as_ref());

        Self {
            target,
            upstream,
            listener,
        }
    }

    pub fn target(&self) -> &Channel<T> {
        &self.target
    }

    pub fn upstream(&self) -> &[Channel<U>] {
        &self.upstream
    }
}

impl<U: ChannelValue, T: ChannelValue> Drop for DerivedChannel<U, T> {
    fn drop(&mut self) {
        for channel in &self.upstream {
            channel.remove_update_listener(&self.listener);
        }
    }
}

/// Sum of all present values, `None` if none is present
pub fn sum_present(values: &[Option<i64>]) -> Option<i64> {
    values
        .iter()
        .flatten()
        .copied()
        .reduce(|acc, v| acc.saturating_add(v))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_value_follows_upstream() {
        let l1: Channel<i64> = Channel::new("meter0", "ActivePowerL1");
        let l2: Channel<i64> = Channel::new("meter0", "ActivePowerL2");
        let l3: Channel<i64> = Channel::new("meter0", "ActivePowerL3");
        let total = DerivedChannel::new(
            Channel::new("meter0", "ActivePower"),
            vec![l1.clone(), l2.clone(), l3.clone()],
            sum_present,
        );
        assert_eq!(total.target().value(), None);

        l1.set_value(100);
        assert_eq!(total.target().value(), Some(100));
        l2.set_value(-30);
        l3.set_value(5);
        assert_eq!(total.target().value(), Some(75));

        l2.invalidate();
        assert_eq!(total.target().value(), Some(105));
    }

    #[test]
    fn test_derived_requires_all_inputs() {
        let voltage: Channel<i64> = Channel::new("ess0", "Voltage");
        let current: Channel<i64> = Channel::new("ess0", "Current");
        let power = DerivedChannel::new(
            Channel::new("ess0", "DcPower"),
            vec![voltage.clone(), current.clone()],
            |values| match values {
                [Some(v), Some(i)] => Some(v * i),
                _ => None,
            },
        );
        voltage.set_value(400);
        assert_eq!(power.target().value(), None);
        current.set_value(-10);
        assert_eq!(power.target().value(), Some(-4000));
    }

    #[test]
    fn test_drop_detaches_from_upstream() {
        let input: Channel<i64> = Channel::new("ess0", "Soc");
        let target: Channel<i64> = Channel::new("ess0", "SocCopy");
        let derived = DerivedChannel::new(target.clone(), vec![input.clone()], |v| v[0]);
        input.set_value(10);
        drop(derived);
        input.set_value(20);
        assert_eq!(target.value(), Some(10));
    }
}
