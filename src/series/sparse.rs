//! Breakpoint-based series with cached prefix integrals.

use serde::Serialize;

use super::{TimeSeries, check_finite, check_range};
use crate::error::{SeriesResult, TimeSeriesError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct Breakpoint {
    time: i64,
    value: f64,
    /// Integral of the positive part from the first breakpoint up to `time`.
    #[serde(skip)]
    positive_before: f64,
    /// Integral of the negative part from the first breakpoint up to `time`.
    #[serde(skip)]
    negative_before: f64,
}

impl Breakpoint {
    fn new(time: i64, value: f64) -> Self {
        Self {
            time,
            value,
            positive_before: 0.0,
            negative_before: 0.0,
        }
    }
}

/// A piecewise-constant series stored as `(time, value)` breakpoints.
///
/// The value at `t` is the value of the last breakpoint at or before `t`, or
/// zero before the first breakpoint. Reads after `length()` keep returning
/// the last value; range sums are clipped to `[0, length())`.
///
/// Each breakpoint caches the positive and negative integrals up to its own
/// time, so [`TimeSeries::sum`] costs two binary searches.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SparseSeries {
    #[serde(rename = "breakpoints")]
    points: Vec<Breakpoint>,
    duration: i64,
}

impl SparseSeries {
    /// Creates an all-zero series defined over `[0, duration)`.
    pub fn new(duration: i64) -> Self {
        Self {
            points: Vec::new(),
            duration: duration.max(0),
        }
    }

    /// Creates a constant series over `[0, duration)`.
    pub fn constant(value: f64, duration: i64) -> SeriesResult<Self> {
        Self::from_points([(0, value)], duration)
    }

    /// Builds a series from `(time, value)` pairs in any order.
    ///
    /// Later pairs overwrite earlier ones at the same time. `duration` grows
    /// to cover the last breakpoint.
    pub fn from_points(
        points: impl IntoIterator<Item = (i64, f64)>,
        duration: i64,
    ) -> SeriesResult<Self> {
        let mut series = Self::new(duration);
        for (t, v) in points {
            series.set(t, v)?;
        }
        Ok(series)
    }

    /// Breakpoints in time order.
    pub fn points(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.points.iter().map(|p| (p.time, p.value))
    }

    /// Number of stored breakpoints.
    pub fn breakpoint_count(&self) -> usize {
        self.points.len()
    }

    /// Value at `t`; never fails.
    pub fn value_at(&self, t: i64) -> f64 {
        self.index_at(t).map_or(0.0, |i| self.points[i].value)
    }

    /// Copy of the series from `t` onward, re-based so that `t` becomes 0.
    pub fn rebased(&self, t: i64) -> SparseSeries {
        let mut out = SparseSeries::new(self.duration - t);
        if out.duration == 0 {
            return out;
        }
        let start = self.value_at(t);
        if start != 0.0 || self.points.iter().any(|p| p.time > t) {
            out.points.push(Breakpoint::new(0, start));
        }
        out.points.extend(
            self.points
                .iter()
                .filter(|p| p.time > t && p.time < self.duration)
                .map(|p| Breakpoint::new(p.time - t, p.value)),
        );
        out.recompute_from(0);
        out
    }

    fn index_at(&self, t: i64) -> Option<usize> {
        match self.points.partition_point(|p| p.time <= t) {
            0 => None,
            n => Some(n - 1),
        }
    }

    fn recompute_from(&mut self, from: usize) {
        if let Some(first) = self.points.first_mut() {
            first.positive_before = 0.0;
            first.negative_before = 0.0;
        }
        for i in from.max(1)..self.points.len() {
            let prev = self.points[i - 1];
            let dt = (self.points[i].time - prev.time) as f64;
            self.points[i].positive_before = prev.positive_before + prev.value.max(0.0) * dt;
            self.points[i].negative_before = prev.negative_before + prev.value.min(0.0) * dt;
        }
    }

    /// Prefix integrals `(positive, negative)` from the first breakpoint to `t`.
    fn integral_to(&self, t: i64) -> (f64, f64) {
        match self.index_at(t) {
            None => (0.0, 0.0),
            Some(i) => {
                let p = &self.points[i];
                let dt = (t - p.time) as f64;
                (
                    p.positive_before + p.value.max(0.0) * dt,
                    p.negative_before + p.value.min(0.0) * dt,
                )
            }
        }
    }

    fn clipped(&self, from: i64, to: i64) -> SeriesResult<(i64, i64)> {
        check_range(from, to)?;
        Ok((from.clamp(0, self.duration), to.clamp(0, self.duration)))
    }

    /// Value contributed inside the defined region only.
    fn defined_value(&self, t: i64) -> f64 {
        if (0..self.duration).contains(&t) {
            self.value_at(t)
        } else {
            0.0
        }
    }
}

impl TimeSeries for SparseSeries {
    fn get(&self, t: i64) -> SeriesResult<f64> {
        Ok(self.value_at(t))
    }

    fn set(&mut self, t: i64, value: f64) -> SeriesResult<()> {
        check_finite(t, value)?;
        if t < 0 {
            return Err(TimeSeriesError::OutOfRange {
                time: t,
                length: self.duration,
            });
        }
        let pos = self.points.partition_point(|p| p.time < t);
        match self.points.get_mut(pos) {
            Some(p) if p.time == t => p.value = value,
            _ => self.points.insert(pos, Breakpoint::new(t, value)),
        }
        self.recompute_from(pos);
        self.duration = self.duration.max(t + 1);
        Ok(())
    }

    fn sum_positive(&self, from: i64, to: i64) -> SeriesResult<f64> {
        let (from, to) = self.clipped(from, to)?;
        Ok(self.integral_to(to).0 - self.integral_to(from).0)
    }

    fn sum_negative(&self, from: i64, to: i64) -> SeriesResult<f64> {
        let (from, to) = self.clipped(from, to)?;
        Ok(self.integral_to(to).1 - self.integral_to(from).1)
    }

    fn next_change(&self, t: i64) -> Option<i64> {
        let current = self.value_at(t);
        let start = self.points.partition_point(|p| p.time <= t);
        self.points[start..]
            .iter()
            .find(|p| p.value != current)
            .map(|p| p.time)
    }

    fn length(&self) -> i64 {
        self.duration
    }

    fn set_length(&mut self, length: i64) -> SeriesResult<()> {
        if length < 0 {
            return Err(TimeSeriesError::InvalidRange { from: 0, to: length });
        }
        let keep = self.points.partition_point(|p| p.time < length);
        self.points.truncate(keep);
        self.duration = length;
        Ok(())
    }

    fn add(&mut self, other: &Self, offset: i64) -> SeriesResult<()> {
        let other_end = offset + other.duration;
        let end = self.duration.max(other_end);

        let mut times: Vec<i64> = self
            .points
            .iter()
            .map(|p| p.time)
            .chain(other.points.iter().map(|p| p.time + offset))
            .chain([offset.max(0), other_end, self.duration])
            .filter(|t| (0..end).contains(t))
            .collect();
        times.sort_unstable();
        times.dedup();

        let mut merged: Vec<Breakpoint> = Vec::with_capacity(times.len());
        for t in times {
            let b = if (offset..other_end).contains(&t) {
                other.value_at(t - offset)
            } else {
                0.0
            };
            let v = self.defined_value(t) + b;
            let unchanged = match merged.last() {
                Some(last) => last.value == v,
                None => v == 0.0,
            };
            if !unchanged {
                merged.push(Breakpoint::new(t, v));
            }
        }

        self.points = merged;
        self.duration = end;
        self.recompute_from(0);
        Ok(())
    }

    fn sub(&mut self, _other: &Self, _offset: i64) -> SeriesResult<()> {
        Err(TimeSeriesError::Unsupported("sub"))
    }

    fn multiply(&mut self, _other: &Self, _offset: i64) -> SeriesResult<()> {
        Err(TimeSeriesError::Unsupported("multiply"))
    }
}
