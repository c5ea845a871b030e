//! TOML-based scenario configuration and preset definitions.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::commodity::AncillaryCommodity;
use crate::coordinator::CoordinatorSettings;
use crate::devices::{
    Appliance, AppliancePhase, BaseLoad, Battery, BatteryMode, Chp, DeviceModel, GasBoiler,
    HotWaterDemand, HotWaterTank, PvGenerator,
};
use crate::error::{ConfigError, SeriesResult};
use crate::ga::{EngineSettings, StoppingRule};
use crate::profile::CompressionPolicy;
use crate::series::SparseSeries;
use crate::sim::{PenaltySettings, PowerLimitSignal, PriceSignal, SignalSnapshot};

const SECONDS_PER_DAY: i64 = 86_400;

/// Top-level scenario configuration parsed from TOML.
///
/// All sections have defaults. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or use one of the built-in presets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Run length and global seed.
    pub simulation: SimulationConfig,
    /// Planning window and cycle timing.
    pub coordinator: CoordinatorSettings,
    /// Genetic optimizer parameters.
    pub optimizer: EngineSettings,
    /// Penalty constants of the simulation core.
    pub penalties: PenaltySettings,
    /// Compression applied to predicted device profiles.
    pub compression: CompressionPolicy,
    /// Tariffs and grid connection limits.
    pub signals: SignalsConfig,
    /// Devices, as `[[devices]]` tables tagged with `type`.
    pub devices: Vec<DeviceConfig>,
}

/// Run length and global seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Absolute time of the first cycle in seconds.
    pub start_time: i64,
    /// Number of scheduling cycles to run (must be > 0).
    pub cycles: usize,
    /// Seed for device predictions.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: 0,
            cycles: 1,
            seed: 42,
        }
    }
}

/// Electricity and gas tariffs plus grid connection limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalsConfig {
    /// Import price per kWh outside the peak window.
    pub import_price_per_kwh: f64,
    /// Feed-in tariff per kWh.
    pub export_price_per_kwh: f64,
    /// Import price per kWh inside the daily peak window; `None` keeps the
    /// tariff flat.
    pub peak_price_per_kwh: Option<f64>,
    /// Daily peak window, hours after midnight.
    pub peak_start_h: f64,
    pub peak_end_h: f64,
    /// Gas price per kWh; `None` leaves gas unpriced.
    pub gas_price_per_kwh: Option<f64>,
    /// Maximum import in watts.
    pub max_import_w: Option<f64>,
    /// Maximum export in watts (positive magnitude).
    pub max_export_w: Option<f64>,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            import_price_per_kwh: 0.30,
            export_price_per_kwh: 0.08,
            peak_price_per_kwh: Some(0.45),
            peak_start_h: 17.0,
            peak_end_h: 21.0,
            gas_price_per_kwh: Some(0.10),
            max_import_w: Some(11_000.0),
            max_export_w: Some(7_000.0),
        }
    }
}

impl SignalsConfig {
    /// Builds the signals in force over `[from, to)`, absolute seconds.
    ///
    /// # Errors
    ///
    /// Returns a `TimeSeriesError` for non-finite prices.
    pub fn snapshot(&self, from: i64, to: i64) -> SeriesResult<SignalSnapshot> {
        let import = match self.peak_price_per_kwh {
            Some(peak) => {
                let first_day = from.div_euclid(SECONDS_PER_DAY);
                let last_day = to.div_euclid(SECONDS_PER_DAY);
                let peak_start = (self.peak_start_h * 3600.0).round() as i64;
                let peak_end = (self.peak_end_h * 3600.0).round() as i64;
                let mut points = Vec::new();
                for day in first_day..=last_day {
                    let midnight = day * SECONDS_PER_DAY;
                    points.push((midnight, self.import_price_per_kwh));
                    points.push((midnight + peak_start, peak));
                    points.push((midnight + peak_end, self.import_price_per_kwh));
                }
                SparseSeries::from_points(points, to.max(1))?
            }
            None => SparseSeries::constant(self.import_price_per_kwh, to.max(1))?,
        };
        let export = SparseSeries::constant(self.export_price_per_kwh, to.max(1))?;

        let mut snapshot = SignalSnapshot::new().with_price(
            AncillaryCommodity::ActivePowerExternal,
            PriceSignal::new(import, export),
        );
        if let Some(gas) = self.gas_price_per_kwh {
            snapshot = snapshot.with_price(
                AncillaryCommodity::NaturalGasPowerExternal,
                PriceSignal::flat(gas, 0.0),
            );
        }
        if self.max_import_w.is_some() || self.max_export_w.is_some() {
            snapshot = snapshot.with_limit(
                AncillaryCommodity::ActivePowerExternal,
                PowerLimitSignal::constant(
                    self.max_import_w.unwrap_or(f64::MAX),
                    self.max_export_w.map_or(f64::MIN, |w| -w),
                ),
            );
        }
        Ok(snapshot)
    }

    fn validate(&self, errors: &mut Vec<ConfigError>) {
        for (field, value) in [
            ("import_price_per_kwh", Some(self.import_price_per_kwh)),
            ("export_price_per_kwh", Some(self.export_price_per_kwh)),
            ("peak_price_per_kwh", self.peak_price_per_kwh),
            ("gas_price_per_kwh", self.gas_price_per_kwh),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                errors.push(ConfigError::new(format!("signals.{field}"), "must be finite"));
            }
        }
        if self.peak_price_per_kwh.is_some()
            && !(0.0 <= self.peak_start_h && self.peak_start_h < self.peak_end_h && self.peak_end_h <= 24.0)
        {
            errors.push(ConfigError::new(
                "signals.peak_start_h",
                "peak window must satisfy 0 <= peak_start_h < peak_end_h <= 24",
            ));
        }
        for (field, value) in [
            ("max_import_w", self.max_import_w),
            ("max_export_w", self.max_export_w),
        ] {
            if value.is_some_and(|v| !(v.is_finite() && v >= 0.0)) {
                errors.push(ConfigError::new(format!("signals.{field}"), "must be >= 0"));
            }
        }
    }
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceConfig {
    BaseLoad(BaseLoad),
    HotWaterDemand(HotWaterDemand),
    Pv(PvGenerator),
    Appliance(Appliance),
    Chp(Chp),
    GasBoiler(GasBoiler),
    HotWaterTank(HotWaterTank),
    Battery(Battery),
}

impl DeviceConfig {
    pub fn model(&self) -> &dyn DeviceModel {
        match self {
            DeviceConfig::BaseLoad(d) => d,
            DeviceConfig::HotWaterDemand(d) => d,
            DeviceConfig::Pv(d) => d,
            DeviceConfig::Appliance(d) => d,
            DeviceConfig::Chp(d) => d,
            DeviceConfig::GasBoiler(d) => d,
            DeviceConfig::HotWaterTank(d) => d,
            DeviceConfig::Battery(d) => d,
        }
    }

    pub fn into_model(self) -> Box<dyn DeviceModel> {
        match self {
            DeviceConfig::BaseLoad(d) => Box::new(d),
            DeviceConfig::HotWaterDemand(d) => Box::new(d),
            DeviceConfig::Pv(d) => Box::new(d),
            DeviceConfig::Appliance(d) => Box::new(d),
            DeviceConfig::Chp(d) => Box::new(d),
            DeviceConfig::GasBoiler(d) => Box::new(d),
            DeviceConfig::HotWaterTank(d) => Box::new(d),
            DeviceConfig::Battery(d) => Box::new(d),
        }
    }
}

fn washer() -> Appliance {
    let mut washer = Appliance::new(
        "washer",
        vec![
            AppliancePhase {
                duration_secs: 1800,
                power_w: 2000.0,
            },
            AppliancePhase {
                duration_secs: 3600,
                power_w: 250.0,
            },
        ],
        8 * 3600,
        20 * 3600,
    );
    washer.delay_cost_per_hour = 0.01;
    washer
}

fn dishwasher() -> Appliance {
    let mut dishwasher = Appliance::new(
        "dishwasher",
        vec![
            AppliancePhase {
                duration_secs: 1200,
                power_w: 1800.0,
            },
            AppliancePhase {
                duration_secs: 2400,
                power_w: 150.0,
            },
            AppliancePhase {
                duration_secs: 900,
                power_w: 1200.0,
            },
        ],
        13 * 3600,
        24 * 3600,
    );
    dishwasher.delay_cost_per_hour = 0.005;
    dishwasher
}

fn preset_optimizer() -> EngineSettings {
    EngineSettings {
        population_size: 24,
        stopping: StoppingRule {
            max_generations: Some(40),
            plateau_generations: Some(10),
            ..StoppingRule::default()
        },
        ..EngineSettings::default()
    }
}

impl ScenarioConfig {
    /// Household with PV, a scheduled battery and two shiftable appliances
    /// under a time-of-use tariff.
    pub fn baseline() -> Self {
        Self {
            optimizer: preset_optimizer(),
            devices: vec![
                DeviceConfig::BaseLoad(BaseLoad::default()),
                DeviceConfig::Pv(PvGenerator::default()),
                DeviceConfig::Battery(Battery::default()),
                DeviceConfig::Appliance(washer()),
                DeviceConfig::Appliance(dishwasher()),
            ],
            ..Self::default()
        }
    }

    /// Large PV array with a battery following the meter and a low
    /// feed-in tariff.
    pub fn self_consumption() -> Self {
        Self {
            optimizer: preset_optimizer(),
            signals: SignalsConfig {
                export_price_per_kwh: 0.04,
                max_export_w: Some(6_000.0),
                ..SignalsConfig::default()
            },
            devices: vec![
                DeviceConfig::BaseLoad(BaseLoad {
                    base_w: 500.0,
                    ..BaseLoad::default()
                }),
                DeviceConfig::Pv(PvGenerator {
                    peak_w: 9000.0,
                    sunrise_h: 5.5,
                    sunset_h: 19.5,
                    ..PvGenerator::default()
                }),
                DeviceConfig::Battery(Battery {
                    mode: BatteryMode::SelfConsumption,
                    capacity_wh: 13_500.0,
                    soc: 0.2,
                    max_charge_w: 5000.0,
                    max_discharge_w: 5000.0,
                    ..Battery::default()
                }),
                DeviceConfig::Appliance(washer()),
            ],
            ..Self::default()
        }
    }

    /// Hot-water system: CHP and backup boiler sharing one tank.
    pub fn thermal() -> Self {
        Self {
            optimizer: preset_optimizer(),
            penalties: PenaltySettings {
                hard_limit_excess_w: Some(5_000.0),
                ..PenaltySettings::default()
            },
            signals: SignalsConfig {
                gas_price_per_kwh: Some(0.08),
                ..SignalsConfig::default()
            },
            devices: vec![
                DeviceConfig::BaseLoad(BaseLoad::default()),
                DeviceConfig::HotWaterDemand(HotWaterDemand {
                    daily_kwh: 9.0,
                    draw_hours: vec![6.5, 12.0, 19.0],
                    ..HotWaterDemand::default()
                }),
                DeviceConfig::HotWaterTank(HotWaterTank::default()),
                DeviceConfig::Chp(Chp::default()),
                DeviceConfig::GasBoiler(GasBoiler::default()),
                DeviceConfig::Pv(PvGenerator {
                    peak_w: 3000.0,
                    ..PvGenerator::default()
                }),
            ],
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "self_consumption", "thermal"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "self_consumption" => Ok(Self::self_consumption()),
            "thermal" => Ok(Self::thermal()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid. An invalid
    /// compression policy is not an error; see [`compression_policy`](Self::compression_policy).
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let s = &self.simulation;
        if s.cycles == 0 {
            errors.push(ConfigError::new("simulation.cycles", "must be > 0"));
        }
        if s.start_time < 0 {
            errors.push(ConfigError::new("simulation.start_time", "must be >= 0"));
        }

        errors.extend(self.coordinator.validate("coordinator"));
        errors.extend(self.optimizer.validate("optimizer"));

        let p = &self.penalties;
        for (field, value) in [
            ("limit_penalty_per_kwh", p.limit_penalty_per_kwh),
            ("infeasible_base", p.infeasible_base),
            ("infeasible_per_step", p.infeasible_per_step),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                errors.push(ConfigError::new(format!("penalties.{field}"), "must be >= 0"));
            }
        }
        if p.hard_limit_excess_w.is_some_and(|w| !(w.is_finite() && w >= 0.0)) {
            errors.push(ConfigError::new("penalties.hard_limit_excess_w", "must be >= 0"));
        }

        self.signals.validate(&mut errors);

        if self.devices.is_empty() {
            errors.push(ConfigError::new("devices", "at least one device is required"));
        }
        let mut seen = BTreeSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            let prefix = format!("devices[{i}]");
            let model = device.model();
            if !seen.insert(model.id()) {
                errors.push(ConfigError::new(
                    format!("{prefix}.id"),
                    format!("duplicate device id \"{}\"", model.id()),
                ));
            }
            errors.extend(model.validate(&prefix));
        }
        errors
    }

    /// The configured compression policy, or the default one if its
    /// parameters cannot be applied.
    pub fn compression_policy(&self) -> CompressionPolicy {
        if self.compression.is_valid() {
            self.compression
        } else {
            let fallback = CompressionPolicy::default();
            warn!(configured = ?self.compression, fallback = ?fallback, "invalid compression policy; using default");
            fallback
        }
    }

    /// End of the last planning window in seconds.
    pub fn end_time(&self) -> i64 {
        let c = &self.coordinator;
        self.simulation.start_time
            + c.period_secs * self.simulation.cycles.saturating_sub(1) as i64
            + c.horizon_secs
    }
}
