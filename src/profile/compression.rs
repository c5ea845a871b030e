//! Lossy compression of predicted load profiles.

use serde::{Deserialize, Serialize};

use crate::error::SeriesResult;
use crate::series::{SparseSeries, TimeSeries};

/// How a predicted profile is thinned before it is handed to the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CompressionPolicy {
    /// Keep every breakpoint.
    None,
    /// Keep a breakpoint only if it moved by more than `threshold` from the
    /// last kept value, or `max_gap` seconds have passed since it.
    Discontinuities { threshold: f64, max_gap: i64 },
    /// Replace the profile with fixed-width buckets holding their averages.
    TimeSlots { width: i64 },
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        CompressionPolicy::Discontinuities {
            threshold: 1.0,
            max_gap: 900,
        }
    }
}

impl CompressionPolicy {
    /// Compresses a single series.
    pub fn compress(&self, series: &SparseSeries) -> SeriesResult<SparseSeries> {
        match *self {
            CompressionPolicy::None => Ok(series.clone()),
            CompressionPolicy::Discontinuities { threshold, max_gap } => {
                let mut kept: Vec<(i64, f64)> = Vec::new();
                for (t, v) in series.points() {
                    let keep = match kept.last() {
                        None => true,
                        Some(&(lt, lv)) => (v - lv).abs() > threshold || t - lt >= max_gap,
                    };
                    if keep {
                        kept.push((t, v));
                    }
                }
                SparseSeries::from_points(kept, series.length())
            }
            CompressionPolicy::TimeSlots { width } => {
                let duration = series.length();
                let mut out = SparseSeries::new(duration);
                let mut last = None;
                let mut from = 0;
                while from < duration {
                    let to = (from + width).min(duration);
                    let avg = series.sum(from, to)? / (to - from) as f64;
                    if last != Some(avg) {
                        out.set(from, avg)?;
                        last = Some(avg);
                    }
                    from = to;
                }
                Ok(out)
            }
        }
    }

    /// Whether the parameters can be applied.
    pub fn is_valid(&self) -> bool {
        match *self {
            CompressionPolicy::None => true,
            CompressionPolicy::Discontinuities { threshold, max_gap } => {
                threshold.is_finite() && threshold >= 0.0 && max_gap > 0
            }
            CompressionPolicy::TimeSlots { width } => width > 0,
        }
    }
}
