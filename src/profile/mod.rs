//! Per-commodity load profiles and the schedules built from them.

pub mod compression;

pub use compression::CompressionPolicy;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::commodity::Commodity;
use crate::error::{SeriesResult, TimeSeriesError};
use crate::series::{SparseSeries, TimeSeries};

/// A bundle of sparse series, one per commodity, with an explicit end time.
///
/// Times are relative to the profile origin. Commodities without a series
/// read as zero everywhere.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LoadProfile {
    series: BTreeMap<Commodity, SparseSeries>,
    end_time: i64,
}

impl LoadProfile {
    /// Creates an empty profile defined over `[0, end_time)`.
    pub fn new(end_time: i64) -> Self {
        Self {
            series: BTreeMap::new(),
            end_time: end_time.max(0),
        }
    }

    /// Exclusive end of the defined region.
    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    /// Moves the end time, truncating or extending every series.
    pub fn set_end_time(&mut self, end_time: i64) -> SeriesResult<()> {
        if end_time < 0 {
            return Err(TimeSeriesError::InvalidRange {
                from: 0,
                to: end_time,
            });
        }
        for s in self.series.values_mut() {
            s.set_length(end_time)?;
        }
        self.end_time = end_time;
        Ok(())
    }

    /// Sets the load of `commodity` from `t` onward.
    ///
    /// Writing at or past the end time extends the profile.
    pub fn set_load(&mut self, commodity: Commodity, t: i64, value: f64) -> SeriesResult<()> {
        let end = self.end_time;
        self.series
            .entry(commodity)
            .or_insert_with(|| SparseSeries::new(end))
            .set(t, value)?;
        if t >= self.end_time {
            self.set_end_time(t + 1)?;
        }
        Ok(())
    }

    /// Load of `commodity` at `t`, or 0 when the commodity is absent.
    pub fn load_at(&self, commodity: Commodity, t: i64) -> f64 {
        self.series.get(&commodity).map_or(0.0, |s| s.value_at(t))
    }

    /// Energy of `commodity` over `[from, to)` in watt-seconds.
    pub fn energy(&self, commodity: Commodity, from: i64, to: i64) -> SeriesResult<f64> {
        match self.series.get(&commodity) {
            Some(s) => s.sum(from, to),
            None if from > to => Err(TimeSeriesError::InvalidRange { from, to }),
            None => Ok(0.0),
        }
    }

    /// Mean load of `commodity` over `[from, to)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` when `to <= from`.
    pub fn average_load(&self, commodity: Commodity, from: i64, to: i64) -> SeriesResult<f64> {
        if to <= from {
            return Err(TimeSeriesError::InvalidRange { from, to });
        }
        Ok(self.energy(commodity, from, to)? / (to - from) as f64)
    }

    /// Overlays `other` shifted right by `offset` seconds.
    ///
    /// The result carries the union of both commodity sets; a commodity
    /// missing from one side contributes zero.
    pub fn merge(&self, other: &LoadProfile, offset: i64) -> SeriesResult<LoadProfile> {
        let mut merged = LoadProfile::new(self.end_time.max(offset + other.end_time));
        let commodities: Vec<Commodity> = self
            .series
            .keys()
            .chain(other.series.keys())
            .copied()
            .collect();
        for commodity in commodities {
            if merged.series.contains_key(&commodity) {
                continue;
            }
            let mut base = self
                .series
                .get(&commodity)
                .cloned()
                .unwrap_or_else(|| SparseSeries::new(self.end_time));
            let empty = SparseSeries::new(other.end_time);
            base.add(other.series.get(&commodity).unwrap_or(&empty), offset)?;
            base.set_length(merged.end_time)?;
            merged.series.insert(commodity, base);
        }
        Ok(merged)
    }

    /// Copy of everything from `t` onward, re-based so that `t` becomes 0.
    pub fn clone_after(&self, t: i64) -> LoadProfile {
        LoadProfile {
            series: self
                .series
                .iter()
                .map(|(c, s)| (*c, s.rebased(t)))
                .collect(),
            end_time: (self.end_time - t).max(0),
        }
    }

    /// Lossy copy with every series compressed by `policy`.
    pub fn compressed(&self, policy: &CompressionPolicy) -> SeriesResult<LoadProfile> {
        let mut series = BTreeMap::new();
        for (c, s) in &self.series {
            series.insert(*c, policy.compress(s)?);
        }
        Ok(LoadProfile {
            series,
            end_time: self.end_time,
        })
    }

    /// Commodities that carry a series.
    pub fn commodities(&self) -> impl Iterator<Item = Commodity> + '_ {
        self.series.keys().copied()
    }

    pub fn series(&self, commodity: Commodity) -> Option<&SparseSeries> {
        self.series.get(&commodity)
    }

    /// Total breakpoints across commodities.
    pub fn breakpoint_count(&self) -> usize {
        self.series.values().map(SparseSeries::breakpoint_count).sum()
    }
}

/// An immutable plan: a load profile, its accumulated device cost, and a name.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Schedule {
    profile: LoadProfile,
    cost: f64,
    name: String,
}

impl Schedule {
    pub fn new(profile: LoadProfile, cost: f64, name: impl Into<String>) -> Self {
        Self {
            profile,
            cost,
            name: name.into(),
        }
    }

    pub fn profile(&self) -> &LoadProfile {
        &self.profile
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sums profiles (aligned at their origins) and costs.
    pub fn merge(&self, other: &Schedule) -> SeriesResult<Schedule> {
        Ok(Schedule {
            profile: self.profile.merge(&other.profile, 0)?,
            cost: self.cost + other.cost,
            name: format!("{}+{}", self.name, other.name),
        })
    }

    /// The still-pending part of the plan after `t`, re-based to 0.
    ///
    /// The cost is carried over unchanged; it was committed when the plan
    /// was chosen.
    pub fn remaining_after(&self, t: i64) -> Schedule {
        Schedule {
            profile: self.profile.clone_after(t),
            cost: self.cost,
            name: self.name.clone(),
        }
    }
}
