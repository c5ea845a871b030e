//! Fixed-resolution series backed by a contiguous value array.

use serde::Serialize;

use super::{TimeSeries, check_finite, check_range};
use crate::error::{SeriesResult, TimeSeriesError};

/// A series with one value per `resolution`-second cell.
///
/// Used for the per-step balances recorded during a simulation run, where
/// every step produces a value and random access must be cheap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DenseSeries {
    values: Vec<f64>,
    resolution: i64,
}

#[derive(Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
}

impl DenseSeries {
    /// Creates an all-zero series of `cells` cells, each `resolution` seconds wide.
    ///
    /// # Panics
    ///
    /// Panics if `resolution <= 0`.
    pub fn zeros(cells: usize, resolution: i64) -> Self {
        assert!(resolution > 0, "resolution must be positive");
        Self {
            values: vec![0.0; cells],
            resolution,
        }
    }

    /// Wraps existing cell values.
    ///
    /// # Panics
    ///
    /// Panics if `resolution <= 0`.
    pub fn from_cells(values: Vec<f64>, resolution: i64) -> Self {
        assert!(resolution > 0, "resolution must be positive");
        Self { values, resolution }
    }

    /// Cell values in time order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Width of one cell in seconds.
    pub fn resolution(&self) -> i64 {
        self.resolution
    }

    fn cell(&self, t: i64) -> SeriesResult<usize> {
        if t < 0 || t >= self.length() {
            return Err(TimeSeriesError::OutOfRange {
                time: t,
                length: self.length(),
            });
        }
        Ok((t / self.resolution) as usize)
    }

    fn integrate(&self, from: i64, to: i64, keep: impl Fn(f64) -> f64) -> SeriesResult<f64> {
        check_range(from, to)?;
        if from < 0 || to > self.length() {
            let time = if from < 0 { from } else { to };
            return Err(TimeSeriesError::OutOfRange {
                time,
                length: self.length(),
            });
        }
        let r = self.resolution;
        let first = from / r;
        let last = (to + r - 1) / r;
        let mut acc = 0.0;
        for i in first..last {
            let lo = from.max(i * r);
            let hi = to.min((i + 1) * r);
            acc += keep(self.values[i as usize]) * (hi - lo) as f64;
        }
        Ok(acc)
    }

    fn combine(&mut self, other: &DenseSeries, offset: i64, op: Op) -> SeriesResult<()> {
        if self.resolution != other.resolution || offset % self.resolution != 0 {
            return Err(TimeSeriesError::ResolutionMismatch {
                left: self.resolution,
                right: other.resolution,
                offset,
            });
        }
        let shift = offset / self.resolution;
        let own = self.values.len() as i64;
        let end = own.max(shift + other.values.len() as i64).max(0);

        let mut merged = Vec::with_capacity(end as usize);
        for i in 0..end {
            let a = (i < own).then(|| self.values[i as usize]);
            let j = i - shift;
            let b = (0..other.values.len() as i64)
                .contains(&j)
                .then(|| other.values[j as usize]);
            let v = match (op, a, b) {
                (Op::Add, Some(a), Some(b)) => a + b,
                (Op::Sub, Some(a), Some(b)) => a - b,
                (Op::Mul, Some(a), Some(b)) => a * b,
                (Op::Add | Op::Sub, Some(a), None) => a,
                (Op::Add, None, Some(b)) => b,
                (Op::Sub, None, Some(b)) => -b,
                (Op::Mul, _, _) | (_, None, None) => 0.0,
            };
            merged.push(v);
        }
        self.values = merged;
        Ok(())
    }
}

impl TimeSeries for DenseSeries {
    fn get(&self, t: i64) -> SeriesResult<f64> {
        Ok(self.values[self.cell(t)?])
    }

    fn set(&mut self, t: i64, value: f64) -> SeriesResult<()> {
        check_finite(t, value)?;
        let i = self.cell(t)?;
        self.values[i] = value;
        Ok(())
    }

    fn sum(&self, from: i64, to: i64) -> SeriesResult<f64> {
        self.integrate(from, to, |v| v)
    }

    fn sum_positive(&self, from: i64, to: i64) -> SeriesResult<f64> {
        self.integrate(from, to, |v| v.max(0.0))
    }

    fn sum_negative(&self, from: i64, to: i64) -> SeriesResult<f64> {
        self.integrate(from, to, |v| v.min(0.0))
    }

    fn next_change(&self, t: i64) -> Option<i64> {
        let i = self.cell(t).ok()?;
        let current = self.values[i];
        self.values[i + 1..]
            .iter()
            .position(|v| *v != current)
            .map(|k| (i + 1 + k) as i64 * self.resolution)
    }

    fn length(&self) -> i64 {
        self.values.len() as i64 * self.resolution
    }

    fn set_length(&mut self, length: i64) -> SeriesResult<()> {
        if length < 0 {
            return Err(TimeSeriesError::InvalidRange { from: 0, to: length });
        }
        let cells = (length + self.resolution - 1) / self.resolution;
        self.values.resize(cells as usize, 0.0);
        Ok(())
    }

    fn add(&mut self, other: &Self, offset: i64) -> SeriesResult<()> {
        self.combine(other, offset, Op::Add)
    }

    fn sub(&mut self, other: &Self, offset: i64) -> SeriesResult<()> {
        self.combine(other, offset, Op::Sub)
    }

    fn multiply(&mut self, other: &Self, offset: i64) -> SeriesResult<()> {
        self.combine(other, offset, Op::Mul)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(values: &[f64]) -> DenseSeries {
        DenseSeries::from_cells(values.to_vec(), 1)
    }

    #[test]
    fn test_add_with_offset_overlapping_tail() {
        let mut a = unit(&[5.0, 5.0, 5.0, 10.0, 10.0]);
        a.add(&unit(&[3.0, 3.0, 3.0]), 1).unwrap();
        assert_eq!(a.values(), &[5.0, 8.0, 8.0, 13.0, 10.0]);
        assert_eq!(a.sum(0, 5).unwrap(), 44.0);
    }

    #[test]
    fn test_add_with_leading_zeros() {
        let mut a = unit(&[5.0, 5.0, 5.0, 10.0, 10.0]);
        a.add(&unit(&[0.0, 0.0, 3.0, 3.0]), 1).unwrap();
        assert_eq!(a.values(), &[5.0, 5.0, 5.0, 13.0, 13.0]);
        assert_eq!(a.sum(0, 5).unwrap(), 41.0);
    }

    #[test]
    fn test_add_is_additive_over_union() {
        let a = unit(&[1.0, -2.0, 3.0]);
        let b = unit(&[4.0, 5.0, -6.0, 7.0]);
        let mut merged = a.clone();
        merged.add(&b, 2).unwrap();
        assert_eq!(merged.length(), 6);
        let expected = a.sum(0, 3).unwrap() + b.sum(0, 4).unwrap();
        assert!((merged.sum(0, 6).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_negative_offset_drops_prefix() {
        let mut a = unit(&[1.0, 1.0]);
        a.add(&unit(&[10.0, 20.0, 30.0]), -1).unwrap();
        assert_eq!(a.values(), &[21.0, 31.0]);
    }

    #[test]
    fn test_sub_and_multiply_one_sided_regions() {
        let mut a = unit(&[4.0, 4.0]);
        a.sub(&unit(&[1.0, 1.0]), 1).unwrap();
        assert_eq!(a.values(), &[4.0, 3.0, -1.0]);

        let mut m = unit(&[2.0, 3.0]);
        m.multiply(&unit(&[10.0, 10.0]), 1).unwrap();
        assert_eq!(m.values(), &[0.0, 30.0, 0.0]);
    }

    #[test]
    fn test_resolution_mismatch() {
        let mut a = DenseSeries::zeros(4, 60);
        let b = DenseSeries::zeros(4, 30);
        assert!(matches!(
            a.add(&b, 0),
            Err(TimeSeriesError::ResolutionMismatch { .. })
        ));
        let c = DenseSeries::zeros(4, 60);
        assert!(matches!(
            a.add(&c, 30),
            Err(TimeSeriesError::ResolutionMismatch { .. })
        ));
    }

    #[test]
    fn test_get_set_bounds() {
        let mut s = DenseSeries::zeros(3, 60);
        s.set(90, 7.0).unwrap();
        assert_eq!(s.get(60).unwrap(), 7.0);
        assert_eq!(s.get(119).unwrap(), 7.0);
        assert!(matches!(s.get(180), Err(TimeSeriesError::OutOfRange { .. })));
        assert!(matches!(s.get(-1), Err(TimeSeriesError::OutOfRange { .. })));
        assert!(matches!(
            s.set(0, f64::NAN),
            Err(TimeSeriesError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_partial_cell_sums() {
        let s = DenseSeries::from_cells(vec![2.0, -4.0], 10);
        assert_eq!(s.sum(5, 15).unwrap(), 2.0 * 5.0 - 4.0 * 5.0);
        assert_eq!(s.sum_positive(0, 20).unwrap(), 20.0);
        assert_eq!(s.sum_negative(0, 20).unwrap(), -40.0);
        assert!(matches!(
            s.sum(10, 5),
            Err(TimeSeriesError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_next_change_and_length() {
        let mut s = DenseSeries::from_cells(vec![1.0, 1.0, 2.0], 60);
        assert_eq!(s.next_change(0), Some(120));
        assert_eq!(s.next_change(130), None);
        s.set_length(300).unwrap();
        assert_eq!(s.length(), 300);
        assert_eq!(s.get(240).unwrap(), 0.0);
    }
}
