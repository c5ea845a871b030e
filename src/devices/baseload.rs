use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::DeviceModel;
use super::types::{PlanningContext, Precomputed, SECONDS_PER_DAY, check_positive, gaussian_noise, predict_profile};
use crate::commodity::Commodity;
use crate::error::{ConfigError, ProblemPartError};
use crate::problem::DeviceStrategy;

/// Predicted household electricity demand.
///
/// The prediction is a daily sinusoid with configurable baseline,
/// amplitude, phase and Gaussian noise, sampled every `resolution_secs`.
///
/// # Examples
///
/// ```
/// use hems_sched::devices::baseload::BaseLoad;
///
/// let load = BaseLoad {
///     base_w: 400.0,
///     amplitude_w: 250.0,
///     ..BaseLoad::default()
/// };
/// // phase 0 peaks at 06:00
/// assert!(load.expected_w(0) < load.expected_w(6 * 3600));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaseLoad {
    pub id: String,

    /// Baseline demand in watts
    pub base_w: f64,

    /// Amplitude of the daily variation in watts
    pub amplitude_w: f64,

    /// Phase offset of the daily pattern in radians
    pub phase_rad: f64,

    /// Standard deviation of the prediction noise in watts
    pub noise_std_w: f64,

    /// Sampling interval of the prediction in seconds
    pub resolution_secs: i64,
}

impl Default for BaseLoad {
    fn default() -> Self {
        Self {
            id: "base_load".to_string(),
            base_w: 400.0,
            amplitude_w: 250.0,
            phase_rad: 0.0,
            noise_std_w: 30.0,
            resolution_secs: 300,
        }
    }
}

impl BaseLoad {
    /// Noise-free demand at absolute time `t`, never negative.
    pub fn expected_w(&self, t: i64) -> f64 {
        let day_pos = t.rem_euclid(SECONDS_PER_DAY) as f64 / SECONDS_PER_DAY as f64; // [0,1)
        let angle = 2.0 * std::f64::consts::PI * day_pos + self.phase_rad;
        (self.base_w + self.amplitude_w * angle.sin()).max(0.0)
    }
}

impl DeviceModel for BaseLoad {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "base_load"
    }

    fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.base_w < 0.0 {
            errors.push(ConfigError::new(format!("{prefix}.base_w"), "must be >= 0"));
        }
        if self.amplitude_w < 0.0 {
            errors.push(ConfigError::new(format!("{prefix}.amplitude_w"), "must be >= 0"));
        }
        if self.noise_std_w < 0.0 {
            errors.push(ConfigError::new(format!("{prefix}.noise_std_w"), "must be >= 0"));
        }
        check_positive(&mut errors, format!("{prefix}.resolution_secs"), self.resolution_secs as f64);
        errors
    }

    fn strategy(&self, ctx: &PlanningContext) -> Result<Arc<dyn DeviceStrategy>, ProblemPartError> {
        let mut rng = StdRng::seed_from_u64(ctx.seed);
        let profile = predict_profile(ctx, Commodity::ActivePower, self.resolution_secs, |t| {
            (self.expected_w(t) + gaussian_noise(&mut rng, self.noise_std_w)).max(0.0)
        })?;
        Ok(Arc::new(Precomputed::new(
            self.kind(),
            vec![Commodity::ActivePower],
            profile,
        )))
    }
}
