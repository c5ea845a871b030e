use std::sync::Arc;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::DeviceModel;
use super::types::{
    PlanningContext, Precomputed, SECONDS_PER_DAY, check_positive, check_range, gaussian_noise,
    predict_profile,
};
use crate::commodity::Commodity;
use crate::error::{ConfigError, ProblemPartError};
use crate::problem::DeviceStrategy;
use crate::sim::objective::WS_PER_KWH;

/// Predicted domestic hot-water draw.
///
/// The daily energy is split evenly over a fixed set of draw events. Each
/// event draws at constant power for `draw_secs`, scaled by a per-event
/// noise factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HotWaterDemand {
    pub id: String,
    /// Thermal energy drawn per day in kWh.
    pub daily_kwh: f64,
    /// Start of each draw event, in hours after midnight.
    pub draw_hours: Vec<f64>,
    pub draw_secs: i64,
    /// Relative standard deviation of each event's energy.
    pub noise_std: f64,
    pub resolution_secs: i64,
}

impl Default for HotWaterDemand {
    fn default() -> Self {
        Self {
            id: "hot_water".to_string(),
            daily_kwh: 6.0,
            draw_hours: vec![7.0, 19.5],
            draw_secs: 1800,
            noise_std: 0.1,
            resolution_secs: 300,
        }
    }
}

impl HotWaterDemand {
    /// Draw power of one event before noise, in watts.
    pub fn event_power_w(&self) -> f64 {
        if self.draw_hours.is_empty() || self.draw_secs <= 0 {
            return 0.0;
        }
        self.daily_kwh * WS_PER_KWH / (self.draw_hours.len() as f64 * self.draw_secs as f64)
    }

    /// Index of the draw event active at absolute time `t`.
    fn active_event(&self, t: i64) -> Option<usize> {
        let tod = t.rem_euclid(SECONDS_PER_DAY);
        self.draw_hours.iter().position(|&h| {
            let start = (h * 3600.0).round() as i64;
            tod >= start && tod < start + self.draw_secs
        })
    }
}

impl DeviceModel for HotWaterDemand {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "hot_water_demand"
    }

    fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.daily_kwh < 0.0 {
            errors.push(ConfigError::new(format!("{prefix}.daily_kwh"), "must be >= 0"));
        }
        for (i, &h) in self.draw_hours.iter().enumerate() {
            check_range(&mut errors, format!("{prefix}.draw_hours[{i}]"), h, 0.0, 24.0);
        }
        check_positive(&mut errors, format!("{prefix}.draw_secs"), self.draw_secs as f64);
        check_range(&mut errors, format!("{prefix}.noise_std"), self.noise_std, 0.0, 1.0);
        check_positive(&mut errors, format!("{prefix}.resolution_secs"), self.resolution_secs as f64);
        errors
    }

    fn strategy(&self, ctx: &PlanningContext) -> Result<Arc<dyn DeviceStrategy>, ProblemPartError> {
        let mut rng = StdRng::seed_from_u64(ctx.seed);
        let power = self.event_power_w();
        // one noise factor per (day, event), drawn when the event is first seen
        let mut factor: Option<((i64, usize), f64)> = None;
        let profile = predict_profile(ctx, Commodity::DomesticHotWaterPower, self.resolution_secs, |t| {
            let Some(event) = self.active_event(t) else {
                return 0.0;
            };
            let key = (t.div_euclid(SECONDS_PER_DAY), event);
            let f = match factor {
                Some((k, f)) if k == key => f,
                _ => {
                    let f = (1.0 + gaussian_noise(&mut rng, self.noise_std)).max(0.0);
                    factor = Some((key, f));
                    f
                }
            };
            power * f
        })?;
        Ok(Arc::new(Precomputed::new(
            self.kind(),
            vec![Commodity::DomesticHotWaterPower],
            profile,
        )))
    }
}
