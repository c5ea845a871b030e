//! Piecewise-constant time series over integer seconds.
//!
//! Two representations share the [`TimeSeries`] trait:
//!
//! - [`DenseSeries`]: one value per fixed-width cell, supports the full
//!   arithmetic set (add, subtract, multiply with offset).
//! - [`SparseSeries`]: breakpoints only, with cached prefix integrals so range
//!   sums are `O(log n)`. Only addition is supported.

pub mod dense;
pub mod sparse;

pub use dense::DenseSeries;
pub use sparse::SparseSeries;

use crate::error::SeriesResult;

/// Common read/write surface of dense and sparse series.
///
/// Time is expressed in whole seconds relative to the series origin. Values
/// are piecewise constant: the value at `t` holds until the next change.
pub trait TimeSeries {
    /// Returns the value at time `t`.
    fn get(&self, t: i64) -> SeriesResult<f64>;

    /// Sets the value from `t` onward until the next existing change.
    fn set(&mut self, t: i64, value: f64) -> SeriesResult<()>;

    /// Integral over `[from, to)` in value-seconds.
    fn sum(&self, from: i64, to: i64) -> SeriesResult<f64> {
        Ok(self.sum_positive(from, to)? + self.sum_negative(from, to)?)
    }

    /// Integral of the positive part over `[from, to)`.
    fn sum_positive(&self, from: i64, to: i64) -> SeriesResult<f64>;

    /// Integral of the negative part over `[from, to)` (a value `<= 0`).
    fn sum_negative(&self, from: i64, to: i64) -> SeriesResult<f64>;

    /// First time after `t` at which the value differs from the value at `t`.
    fn next_change(&self, t: i64) -> Option<i64>;

    /// Length of the defined region in seconds.
    fn length(&self) -> i64;

    /// Grows or truncates the defined region.
    fn set_length(&mut self, length: i64) -> SeriesResult<()>;

    /// Adds `other`, shifted right by `offset` seconds, into `self`.
    ///
    /// Where only one operand is defined its values are kept unchanged, and
    /// the result covers the union of both defined regions.
    fn add(&mut self, other: &Self, offset: i64) -> SeriesResult<()>
    where
        Self: Sized;

    /// Subtracts `other`, shifted right by `offset` seconds, from `self`.
    fn sub(&mut self, other: &Self, offset: i64) -> SeriesResult<()>
    where
        Self: Sized;

    /// Multiplies `self` by `other` shifted right by `offset` seconds.
    ///
    /// Regions where only one operand is defined become zero.
    fn multiply(&mut self, other: &Self, offset: i64) -> SeriesResult<()>
    where
        Self: Sized;
}

pub(crate) fn check_range(from: i64, to: i64) -> SeriesResult<()> {
    if from > to {
        Err(crate::error::TimeSeriesError::InvalidRange { from, to })
    } else {
        Ok(())
    }
}

pub(crate) fn check_finite(t: i64, value: f64) -> SeriesResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(crate::error::TimeSeriesError::NonFinite { time: t, value })
    }
}
