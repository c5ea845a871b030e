//! Reference device models.
//!
//! Each model is a plain parameter struct loaded from a scenario file. Once
//! per scheduling cycle it builds a [`DeviceStrategy`] for the cycle's time
//! frame, which the simulation core then starts once per candidate.

use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, ProblemPartError};
use crate::problem::{DecisionVariables, DeviceStrategy};
use crate::profile::Schedule;

/// Shiftable appliance with a multi-phase run profile.
pub mod appliance;
/// Predicted household electricity demand.
pub mod baseload;
/// Stationary battery storage.
pub mod battery;
/// Gas boiler with temperature hysteresis.
pub mod boiler;
/// Combined heat and power unit.
pub mod chp;
/// Predicted domestic hot-water draw.
pub mod hot_water;
/// Photovoltaic generator with correlated cloud variability.
pub mod pv;
/// Hot-water storage tank.
pub mod tank;
pub mod types;

pub use appliance::{Appliance, AppliancePhase};
pub use baseload::BaseLoad;
pub use battery::{Battery, BatteryMode};
pub use boiler::GasBoiler;
pub use chp::Chp;
pub use hot_water::HotWaterDemand;
pub use pv::PvGenerator;
pub use tank::HotWaterTank;
pub use types::PlanningContext;

/// A configured device that contributes a problem part to every cycle.
pub trait DeviceModel: fmt::Debug + Send + Sync {
    /// Registry identifier.
    fn id(&self) -> &str;

    /// Short type name, e.g. `"battery"`.
    fn kind(&self) -> &'static str;

    /// Checks parameters, reporting fields under `prefix`.
    fn validate(&self, prefix: &str) -> Vec<ConfigError>;

    /// Builds the strategy for one cycle.
    fn strategy(&self, ctx: &PlanningContext) -> Result<Arc<dyn DeviceStrategy>, ProblemPartError>;

    /// Carries the device's state forward to `until` along the plan chosen
    /// in the previous cycle.
    ///
    /// # Arguments
    ///
    /// * `decisions` - Decision variables of the chosen plan
    /// * `schedule` - Chosen plan, relative to `plan_start`
    /// * `plan_start` - Absolute start of the plan (seconds)
    /// * `until` - Absolute time the new cycle starts at (seconds)
    fn advance(
        &mut self,
        _decisions: &DecisionVariables,
        _schedule: &Schedule,
        _plan_start: i64,
        _until: i64,
    ) {
    }
}
