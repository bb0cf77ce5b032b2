//! Value types a channel can hold
//!
//! `ChannelValue` is implemented for `bool`, `String` and the primitive
//! numeric types. Numeric types go through [`Numeric`] so that scaling,
//! midpoint resolution and converters share one rounding rule.

use std::fmt::{Debug, Display};

use crate::scaling::Scaling;

/// Primitive numeric value
///
/// Integer conversions from `f64` round half away from zero and fail on
/// NaN or out-of-range input instead of saturating silently.
pub trait Numeric: Copy + PartialOrd + Debug + Display + Send + Sync + 'static {
    const IS_INTEGER: bool;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Option<Self>;

    fn zero() -> Self;
}

macro_rules! impl_numeric_int {
    ($($ty:ty),*) => {
        $(
            impl Numeric for $ty {
                const IS_INTEGER: bool = true;

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_f64(value: f64) -> Option<Self> {
                    if !value.is_finite() {
                        return None;
                    }
                    let rounded = value.round();
                    if rounded < <$ty>::MIN as f64 || rounded > <$ty>::MAX as f64 {
                        return None;
                    }
                    Some(rounded as $ty)
                }

                fn zero() -> Self {
                    0
                }
            }
        )*
    };
}

impl_numeric_int!(i16, u16, i32, u32, i64, u64);

impl Numeric for f32 {
    const IS_INTEGER: bool = false;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn from_f64(value: f64) -> Option<Self> {
        if value.is_nan() {
            return None;
        }
        Some(value as f32)
    }

    fn zero() -> Self {
        0.0
    }
}

impl Numeric for f64 {
    const IS_INTEGER: bool = false;

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Option<Self> {
        if value.is_nan() {
            return None;
        }
        Some(value)
    }

    fn zero() -> Self {
        0.0
    }
}

/// A value that can be stored in a channel
pub trait ChannelValue: Clone + PartialEq + PartialOrd + Debug + Display + Send + Sync + 'static {
    /// Raw value to stored value. `None` if the result is not representable.
    fn apply_scaling(self, scaling: &Scaling) -> Option<Self> {
        let _ = scaling;
        Some(self)
    }

    /// Stored value back to raw device units
    fn remove_scaling(self, scaling: &Scaling) -> Option<Self> {
        let _ = scaling;
        Some(self)
    }

    /// Value halfway between two bounds, `low` for non-numeric types
    fn halfway(low: &Self, high: &Self) -> Self {
        let _ = high;
        low.clone()
    }

    fn is_zero(&self) -> bool {
        false
    }

    /// Key into the channel's label map
    fn label_key(&self) -> Option<i64> {
        None
    }
}

macro_rules! impl_channel_value_numeric {
    ($($ty:ty),*) => {
        $(
            impl ChannelValue for $ty {
                fn apply_scaling(self, scaling: &Scaling) -> Option<Self> {
                    if scaling.is_identity() {
                        return Some(self);
                    }
                    let mut scaled = scaling.apply(self.to_f64());
                    if <$ty as Numeric>::IS_INTEGER {
                        scaled = scaled.round();
                    }
                    <$ty as Numeric>::from_f64(scaled - scaling.delta)
                }

                fn remove_scaling(self, scaling: &Scaling) -> Option<Self> {
                    if scaling.is_identity() {
                        return Some(self);
                    }
                    <$ty as Numeric>::from_f64(scaling.remove(self.to_f64()))
                }

                fn halfway(low: &Self, high: &Self) -> Self {
                    let mid = (low.to_f64() + high.to_f64()) / 2.0;
                    <$ty as Numeric>::from_f64(mid).unwrap_or(*low)
                }

                fn is_zero(&self) -> bool {
                    self.to_f64() == 0.0
                }

                fn label_key(&self) -> Option<i64> {
                    if <$ty as Numeric>::IS_INTEGER {
                        Some(self.to_f64() as i64)
                    } else {
                        None
                    }
                }
            }
        )*
    };
}

impl_channel_value_numeric!(i16, u16, i32, u32, i64, u64, f32, f64);

impl ChannelValue for bool {
    fn label_key(&self) -> Option<i64> {
        Some(i64::from(*self))
    }
}

impl ChannelValue for String {}
