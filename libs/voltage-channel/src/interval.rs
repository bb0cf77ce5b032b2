//! Closed value interval with optional bounds

use std::fmt;

use crate::value::ChannelValue;

/// `[min, max]`, each bound optional
///
/// An interval whose `min` is greater than its `max` is empty and
/// contains no value.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval<T> {
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T> Default for Interval<T> {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
        }
    }
}

impl<T: ChannelValue> Interval<T> {
    pub fn new(min: Option<T>, max: Option<T>) -> Self {
        Self { min, max }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn is_empty(&self) -> bool {
        matches!((&self.min, &self.max), (Some(min), Some(max)) if min > max)
    }

    pub fn contains(&self, value: &T) -> bool {
        if self.is_empty() {
            return false;
        }
        let above_min = self.min.as_ref().map_or(true, |min| value >= min);
        let below_max = self.max.as_ref().map_or(true, |max| value <= max);
        above_min && below_max
    }

    /// Raise the lower bound to `min` if that is tighter
    pub fn narrow_min(&mut self, min: T) {
        match &self.min {
            Some(current) if *current >= min => {},
            _ => self.min = Some(min),
        }
    }

    /// Lower the upper bound to `max` if that is tighter
    pub fn narrow_max(&mut self, max: T) {
        match &self.max {
            Some(current) if *current <= max => {},
            _ => self.max = Some(max),
        }
    }

    /// Tightest interval contained in both
    pub fn intersect(&self, other: &Interval<T>) -> Interval<T> {
        let mut result = self.clone();
        if let Some(min) = &other.min {
            result.narrow_min(min.clone());
        }
        if let Some(max) = &other.max {
            result.narrow_max(max.clone());
        }
        result
    }

    /// Single value representing the interval
    ///
    /// Midpoint if both bounds exist, else the bound that exists. `None`
    /// for an unbounded or empty interval.
    pub fn resolve(&self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => Some(T::halfway(min, max)),
            (Some(min), None) => Some(min.clone()),
            (None, Some(max)) => Some(max.clone()),
            (None, None) => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Interval<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.min {
            Some(min) => write!(f, "[{min}, ")?,
            None => write!(f, "[-inf, ")?,
        }
        match &self.max {
            Some(max) => write!(f, "{max}]"),
            None => write!(f, "+inf]"),
        }
    }
}
