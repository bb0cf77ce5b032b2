//! Element-to-channel converters
//!
//! A converter is a pair of functions bound to one element type `E` and one
//! channel type `C`: forward (`E -> Option<C>`, `None` meaning "not
//! available") on the read path and backward (`C -> E`) on the write path.
//! Composition runs forward functions left to right and backward functions
//! right to left, so a chain round-trips whenever each link does.

use std::fmt;
use std::sync::Arc;

use voltage_channel::{scale_pow10, Numeric};

use super::error::ConversionError;

type ForwardFn<E, C> = dyn Fn(E) -> Option<C> + Send + Sync;
type BackwardFn<C, E> = dyn Fn(C) -> Result<E, ConversionError> + Send + Sync;

pub struct Converter<E, C> {
    forward: Arc<ForwardFn<E, C>>,
    backward: Option<Arc<BackwardFn<C, E>>>,
}

impl<E, C> Clone for Converter<E, C> {
    fn clone(&self) -> Self {
        Self {
            forward: Arc::clone(&self.forward),
            backward: self.backward.clone(),
        }
    }
}

impl<E, C> fmt::Debug for Converter<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("reversible", &self.backward.is_some())
            .finish()
    }
}

impl<E: 'static, C: 'static> Converter<E, C> {
    pub fn new<F, B>(forward: F, backward: B) -> Self
    where
        F: Fn(E) -> Option<C> + Send + Sync + 'static,
        B: Fn(C) -> Result<E, ConversionError> + Send + Sync + 'static,
    {
        Self {
            forward: Arc::new(forward),
            backward: Some(Arc::new(backward)),
        }
    }

    /// Converter for read-only bindings; the backward path fails with
    /// [`ConversionError::ForwardOnly`]
    pub fn forward_only<F>(forward: F) -> Self
    where
        F: Fn(E) -> Option<C> + Send + Sync + 'static,
    {
        Self {
            forward: Arc::new(forward),
            backward: None,
        }
    }

    pub fn is_reversible(&self) -> bool {
        self.backward.is_some()
    }

    pub fn element_to_channel(&self, value: E) -> Option<C> {
        (self.forward)(value)
    }

    pub fn channel_to_element(&self, value: C) -> Result<E, ConversionError> {
        match &self.backward {
            Some(backward) => backward(value),
            None => Err(ConversionError::ForwardOnly),
        }
    }

    /// `self` then `next` on the read path, `next` then `self` on the write
    /// path. Forward-only if either side is.
    pub fn then<D: 'static>(self, next: Converter<C, D>) -> Converter<E, D> {
        let first = Arc::clone(&self.forward);
        let second = Arc::clone(&next.forward);
        let forward = move |value: E| first(value).and_then(|c| second(c));

        let backward = match (self.backward, next.backward) {
            (Some(first_back), Some(second_back)) => {
                let backward = move |value: D| second_back(value).and_then(|c| first_back(c));
                Some(Arc::new(backward) as Arc<BackwardFn<D, E>>)
            },
            _ => None,
        };

        Converter {
            forward: Arc::new(forward),
            backward,
        }
    }
}

impl<T: Send + Sync + 'static> Converter<T, T> {
    pub fn identity() -> Self {
        Self::new(Some, Ok)
    }

    /// Compose same-typed converters in order
    pub fn chain(converters: impl IntoIterator<Item = Converter<T, T>>) -> Self {
        converters
            .into_iter()
            .fold(Self::identity(), |acc, next| acc.then(next))
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Converter<T, T> {
    /// Map a "not available" raw code to `None` or a substitute
    ///
    /// The write path passes values through unchanged.
    pub fn replace(sentinel: T, substitute: Option<T>) -> Self {
        Self::new(
            move |value: T| {
                if value == sentinel {
                    substitute.clone()
                } else {
                    Some(value)
                }
            },
            Ok,
        )
    }
}

fn out_of_range<T: fmt::Display>(value: T) -> ConversionError {
    ConversionError::OutOfRange(value.to_string())
}

fn negate<T: Numeric>(value: T) -> Option<T> {
    T::from_f64(-value.to_f64())
}

impl<E: Numeric, C: Numeric> Converter<E, C> {
    /// Multiply by `10^exponent` on the read path, divide on the write path
    ///
    /// A device reporting 0.1 V units into a volt channel uses `-1`.
    pub fn scale_pow10(exponent: i32) -> Self {
        Self::new(
            move |raw: E| C::from_f64(scale_pow10(raw.to_f64(), exponent)),
            move |value: C| {
                E::from_f64(scale_pow10(value.to_f64(), -exponent)).ok_or_else(|| out_of_range(value))
            },
        )
    }

    /// Numeric cast between element and channel type
    pub fn cast() -> Self {
        Self::scale_pow10(0)
    }

    /// Add `delta` on the read path, subtract on the write path
    pub fn offset(delta: f64) -> Self {
        Self::new(
            move |raw: E| C::from_f64(raw.to_f64() + delta),
            move |value: C| E::from_f64(value.to_f64() - delta).ok_or_else(|| out_of_range(value)),
        )
    }
}

impl<T: Numeric> Converter<T, T> {
    pub fn invert() -> Self {
        Self::new(negate, |value: T| negate(value).ok_or_else(|| out_of_range(value)))
    }

    /// Invert only when `invert` is set, e.g. from a configuration flag
    pub fn invert_if(invert: bool) -> Self {
        if invert {
            Self::invert()
        } else {
            Self::identity()
        }
    }

    /// Positive values pass, everything else becomes zero
    pub fn keep_positive() -> Self {
        fn positive<T: Numeric>(value: T) -> T {
            if value > T::zero() {
                value
            } else {
                T::zero()
            }
        }
        Self::new(|value: T| Some(positive(value)), |value: T| Ok(positive(value)))
    }

    /// Negative values are inverted, everything else becomes zero
    ///
    /// Splits a signed power into its consumption part. On the write path a
    /// positive channel value becomes the negative raw value.
    pub fn keep_negative_and_invert() -> Self {
        Self::new(
            |raw: T| {
                if raw < T::zero() {
                    negate(raw)
                } else {
                    Some(T::zero())
                }
            },
            |value: T| {
                if value > T::zero() {
                    negate(value).ok_or_else(|| out_of_range(value))
                } else {
                    Ok(T::zero())
                }
            },
        )
    }
}
