//! Shared building blocks for device strategies.

use std::sync::Arc;

use rand::{Rng, rngs::StdRng};

use crate::commodity::{Commodity, LimitedCommodityStateMap};
use crate::error::{ConfigError, ProblemPartError, SeriesResult};
use crate::problem::{
    Capabilities, DecisionVariables, DeviceStrategy, PartRun, PartStep, PartWindow, StepContext,
};
use crate::profile::{CompressionPolicy, LoadProfile};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// What a device sees when it builds its strategy for one scheduling cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanningContext {
    /// Start of the cycle, absolute seconds.
    pub reference_time: i64,
    /// End of the cycle, absolute seconds (exclusive).
    pub horizon: i64,
    /// Seed for the device's own prediction noise.
    pub seed: u64,
    /// Thinning applied to predicted profiles.
    pub compression: CompressionPolicy,
}

impl PlanningContext {
    /// Planning span in seconds.
    pub fn span(&self) -> i64 {
        (self.horizon - self.reference_time).max(0)
    }

    /// Number of decision slots of `width` seconds covering the span.
    pub fn slots(&self, width: i64) -> usize {
        if width <= 0 {
            return 0;
        }
        ((self.span() + width - 1) / width) as usize
    }
}

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Half-cosine daylight shape: 0 outside `[sunrise, sunset)`, 1 at solar noon.
///
/// # Arguments
///
/// * `t` - Absolute time in seconds
/// * `sunrise` - Seconds after midnight (inclusive)
/// * `sunset` - Seconds after midnight (exclusive)
pub fn daylight_frac(t: i64, sunrise: i64, sunset: i64) -> f64 {
    let tod = t.rem_euclid(SECONDS_PER_DAY);
    if sunset <= sunrise || tod < sunrise || tod >= sunset {
        return 0.0;
    }
    let x = (tod - sunrise) as f64 / (sunset - sunrise) as f64;
    (std::f64::consts::PI * x).sin()
}

/// Pushes an error unless `value` lies in `[lo, hi]`.
pub(crate) fn check_range(
    errors: &mut Vec<ConfigError>,
    field: String,
    value: f64,
    lo: f64,
    hi: f64,
) {
    if !(value >= lo && value <= hi) {
        errors.push(ConfigError::new(
            field,
            format!("must be in [{lo}, {hi}], got {value}"),
        ));
    }
}

/// Pushes an error unless `value > 0`.
pub(crate) fn check_positive(errors: &mut Vec<ConfigError>, field: String, value: f64) {
    if !(value > 0.0) {
        errors.push(ConfigError::new(field, format!("must be > 0, got {value}")));
    }
}

/// Fails when an interval a strategy divides by is not positive.
pub(crate) fn require_positive_secs(
    device: &str,
    field: &str,
    secs: i64,
) -> Result<(), ProblemPartError> {
    if secs <= 0 {
        return Err(ProblemPartError::Model {
            device: device.to_string(),
            message: format!("{field} must be > 0, got {secs}"),
        });
    }
    Ok(())
}

/// Samples `value(t)` every `resolution` seconds over the planning span and
/// compresses the result with the context's policy.
///
/// `value` receives absolute times; the profile is relative to the
/// reference time.
pub(crate) fn predict_profile(
    ctx: &PlanningContext,
    commodity: Commodity,
    resolution: i64,
    mut value: impl FnMut(i64) -> f64,
) -> SeriesResult<LoadProfile> {
    let span = ctx.span();
    let mut profile = LoadProfile::new(span);
    let mut rel = 0;
    while rel < span {
        profile.set_load(commodity, rel, value(ctx.reference_time + rel))?;
        rel += resolution.max(1);
    }
    profile.compressed(&ctx.compression)
}

/// An exogenous device whose output was predicted before the cycle.
///
/// Every step reads the mean of the predicted profile over the step, so
/// evaluations only slice a shared profile.
#[derive(Debug)]
pub struct Precomputed {
    kind: &'static str,
    outputs: Vec<Commodity>,
    /// Relative to the cycle's reference time.
    profile: Arc<LoadProfile>,
}

impl Precomputed {
    pub fn new(kind: &'static str, outputs: Vec<Commodity>, profile: LoadProfile) -> Self {
        Self {
            kind,
            outputs,
            profile: Arc::new(profile),
        }
    }

    pub fn profile(&self) -> &LoadProfile {
        &self.profile
    }
}

impl DeviceStrategy for Precomputed {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PASSIVE
    }

    fn output_commodities(&self) -> &[Commodity] {
        &self.outputs
    }

    fn start(
        &self,
        window: &PartWindow,
        _decisions: &DecisionVariables,
    ) -> Result<Box<dyn PartRun>, ProblemPartError> {
        Ok(Box::new(PrecomputedRun {
            reference_time: window.reference_time,
            outputs: self.outputs.clone(),
            profile: Arc::clone(&self.profile),
        }))
    }
}

struct PrecomputedRun {
    reference_time: i64,
    outputs: Vec<Commodity>,
    profile: Arc<LoadProfile>,
}

impl PartRun for PrecomputedRun {
    fn step(
        &mut self,
        ctx: &StepContext<'_>,
        out: &mut LimitedCommodityStateMap,
    ) -> Result<PartStep, ProblemPartError> {
        let from = ctx.time - self.reference_time;
        let to = (from + ctx.step_size).min(self.profile.end_time());
        for &commodity in &self.outputs {
            let power = if to > from {
                self.profile.average_load(commodity, from, to)?
            } else {
                self.profile.load_at(commodity, from)
            };
            out.set_power(commodity, power);
        }
        Ok(PartStep::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_daylight_frac() {
        let (rise, set) = (6 * 3600, 18 * 3600);
        assert_eq!(daylight_frac(0, rise, set), 0.0);
        assert_eq!(daylight_frac(set, rise, set), 0.0);
        assert!(daylight_frac(rise, rise, set) < 0.1);
        assert!(daylight_frac(12 * 3600, rise, set) > 0.99);
        // next day repeats
        assert!(
            (daylight_frac(9 * 3600, rise, set) - daylight_frac(SECONDS_PER_DAY + 9 * 3600, rise, set))
                .abs()
                < 1e-12
        );
        assert!((daylight_frac(9 * 3600, rise, set) - daylight_frac(15 * 3600, rise, set)).abs() < 1e-9);
    }

    #[test]
    fn test_gaussian_noise_zero_std() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gaussian_noise(&mut rng, 0.0), 0.0);
        assert_eq!(gaussian_noise(&mut rng, -1.0), 0.0);
    }

    #[test]
    fn test_slots_round_up() {
        let ctx = PlanningContext {
            reference_time: 0,
            horizon: 7200 + 1,
            seed: 0,
            compression: CompressionPolicy::None,
        };
        assert_eq!(ctx.slots(3600), 3);
        assert_eq!(ctx.slots(0), 0);
    }

    #[test]
    fn test_precomputed_averages_over_step() {
        let mut profile = LoadProfile::new(600);
        profile.set_load(Commodity::ActivePower, 0, 100.0).unwrap();
        profile.set_load(Commodity::ActivePower, 150, 300.0).unwrap();
        let strategy = Precomputed::new("base_load", vec![Commodity::ActivePower], profile);
        let window = PartWindow {
            reference_time: 1000,
            horizon: 1600,
            step_size: 300,
        };
        let mut run = strategy.start(&window, &DecisionVariables::None).unwrap();
        let inputs = LimitedCommodityStateMap::new();
        let mut out = LimitedCommodityStateMap::new();
        let ctx = StepContext {
            time: 1000,
            step_size: 300,
            inputs: &inputs,
            meter: None,
        };
        run.step(&ctx, &mut out).unwrap();
        assert!((out.power(Commodity::ActivePower) - 200.0).abs() < 1e-9);
    }
}
