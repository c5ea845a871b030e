use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::DeviceModel;
use super::types::{
    PlanningContext, Precomputed, check_positive, check_range, daylight_frac, gaussian_noise,
    predict_profile,
};
use crate::commodity::Commodity;
use crate::error::{ConfigError, ProblemPartError};
use crate::problem::DeviceStrategy;

/// Minimum cloud multiplier (heavy overcast).
const MULTIPLIER_MIN: f64 = 0.2;
/// Maximum cloud multiplier (enhanced irradiance from cloud edges).
const MULTIPLIER_MAX: f64 = 1.2;

/// Photovoltaic generator with a temporally correlated cloud multiplier.
///
/// The multiplier evolves per prediction sample as
/// ```text
/// m(t) = alpha * m(t-1) + (1 - alpha) * (1 + epsilon(t))
/// ```
/// and is clamped to \[0.2, 1.2\]. Output follows a half-cosine daylight
/// shape between sunrise and sunset.
///
/// # Power Flow Convention
/// Returns **negative** values during daylight (generation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PvGenerator {
    pub id: String,
    /// Peak output in watts under clear sky.
    pub peak_w: f64,
    /// Hours after midnight.
    pub sunrise_h: f64,
    pub sunset_h: f64,
    /// AR(1) correlation coefficient (0 = uncorrelated, 1 = fully persistent).
    pub alpha: f64,
    /// Standard deviation of the AR(1) innovation.
    pub cloud_noise_std: f64,
    pub resolution_secs: i64,
}

impl Default for PvGenerator {
    fn default() -> Self {
        Self {
            id: "pv".to_string(),
            peak_w: 5000.0,
            sunrise_h: 6.0,
            sunset_h: 18.0,
            alpha: 0.8,
            cloud_noise_std: 0.1,
            resolution_secs: 300,
        }
    }
}

impl PvGenerator {
    fn sun_window(&self) -> (i64, i64) {
        (
            (self.sunrise_h * 3600.0).round() as i64,
            (self.sunset_h * 3600.0).round() as i64,
        )
    }

    /// Clear-sky output at absolute time `t`, `<= 0`.
    pub fn clear_sky_w(&self, t: i64) -> f64 {
        let (rise, set) = self.sun_window();
        -(self.peak_w * daylight_frac(t, rise, set))
    }
}

impl DeviceModel for PvGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "pv"
    }

    fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.peak_w < 0.0 {
            errors.push(ConfigError::new(format!("{prefix}.peak_w"), "must be >= 0"));
        }
        check_range(&mut errors, format!("{prefix}.sunrise_h"), self.sunrise_h, 0.0, 24.0);
        check_range(&mut errors, format!("{prefix}.sunset_h"), self.sunset_h, 0.0, 24.0);
        if self.sunset_h <= self.sunrise_h {
            errors.push(ConfigError::new(
                format!("{prefix}.sunset_h"),
                format!("must be after sunrise_h ({})", self.sunrise_h),
            ));
        }
        check_range(&mut errors, format!("{prefix}.alpha"), self.alpha, 0.0, 1.0);
        if self.cloud_noise_std < 0.0 {
            errors.push(ConfigError::new(format!("{prefix}.cloud_noise_std"), "must be >= 0"));
        }
        check_positive(&mut errors, format!("{prefix}.resolution_secs"), self.resolution_secs as f64);
        errors
    }

    fn strategy(&self, ctx: &PlanningContext) -> Result<Arc<dyn DeviceStrategy>, ProblemPartError> {
        let mut rng = StdRng::seed_from_u64(ctx.seed);
        let mut multiplier = 1.0;
        let profile = predict_profile(ctx, Commodity::ActivePower, self.resolution_secs, |t| {
            // the multiplier evolves at night too, keeping its correlation
            let epsilon = gaussian_noise(&mut rng, self.cloud_noise_std);
            multiplier = (self.alpha * multiplier + (1.0 - self.alpha) * (1.0 + epsilon))
                .clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
            self.clear_sky_w(t) * multiplier
        })?;
        Ok(Arc::new(Precomputed::new(
            self.kind(),
            vec![Commodity::ActivePower],
            profile,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::types::SECONDS_PER_DAY;
    use crate::problem::{DecisionVariables, PartWindow, StepContext};
    use crate::commodity::LimitedCommodityStateMap;
    use crate::profile::CompressionPolicy;

    #[test]
    fn test_clear_sky_shape() {
        let pv = PvGenerator::default();
        assert_eq!(pv.clear_sky_w(0), 0.0);
        assert_eq!(pv.clear_sky_w(18 * 3600), 0.0);
        assert!(pv.clear_sky_w(12 * 3600) < -4990.0);
    }

    #[test]
    fn test_prediction_never_positive() {
        let pv = PvGenerator {
            cloud_noise_std: 0.5,
            ..PvGenerator::default()
        };
        let ctx = PlanningContext {
            reference_time: 0,
            horizon: SECONDS_PER_DAY,
            seed: 3,
            compression: CompressionPolicy::None,
        };
        let strategy = pv.strategy(&ctx).unwrap();
        let window = PartWindow {
            reference_time: 0,
            horizon: SECONDS_PER_DAY,
            step_size: 900,
        };
        let mut run = strategy.start(&window, &DecisionVariables::None).unwrap();
        let inputs = LimitedCommodityStateMap::new();
        let mut out = LimitedCommodityStateMap::new();
        let mut produced = 0.0;
        for k in 0..96 {
            let step = StepContext {
                time: k * 900,
                step_size: 900,
                inputs: &inputs,
                meter: None,
            };
            run.step(&step, &mut out).unwrap();
            let p = out.power(Commodity::ActivePower);
            assert!(p <= 0.0, "positive PV output {p} at step {k}");
            produced += p;
        }
        assert!(produced < 0.0);
    }

    #[test]
    fn test_sunset_before_sunrise_rejected() {
        let pv = PvGenerator {
            sunrise_h: 18.0,
            sunset_h: 6.0,
            ..PvGenerator::default()
        };
        let errors = pv.validate("devices[1]");
        assert!(errors.iter().any(|e| e.field == "devices[1].sunset_h"));
    }
}
