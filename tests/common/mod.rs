//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use hems_sched::commodity::AncillaryCommodity;
use hems_sched::devices::{Appliance, AppliancePhase, DeviceModel, PlanningContext};
use hems_sched::ga::{Algorithm, EngineSettings, StoppingRule};
use hems_sched::problem::{DeviceId, ProblemPart};
use hems_sched::profile::CompressionPolicy;
use hems_sched::series::SparseSeries;
use hems_sched::sim::{
    PenaltySettings, PowerLimitSignal, PriceSignal, SignalSnapshot, SimulationCore,
    SimulationSettings,
};

/// Four-hour planning window starting at 0 (seed 42, no compression).
pub fn default_context() -> PlanningContext {
    PlanningContext {
        reference_time: 0,
        horizon: 4 * 3600,
        seed: 42,
        compression: CompressionPolicy::None,
    }
}

/// One-hour 2 kW washer that may start anywhere in `[0, 3h]` on a
/// 15-minute grid.
pub fn default_washer() -> Appliance {
    Appliance::new(
        "washer",
        vec![AppliancePhase {
            duration_secs: 3600,
            power_w: 2000.0,
        }],
        0,
        4 * 3600,
    )
}

/// Problem part of `model` for `ctx`.
pub fn part_for(model: &dyn DeviceModel, ctx: &PlanningContext) -> ProblemPart {
    let strategy = model.strategy(ctx).expect("strategy should build");
    ProblemPart::new(DeviceId::new(model.id()), ctx.reference_time, ctx.horizon, strategy)
        .expect("part should build")
}

/// Import price 0.30 until 2h, 0.10 afterwards; no feed-in tariff.
pub fn falling_tariff() -> SignalSnapshot {
    let import = SparseSeries::from_points([(0, 0.30), (7200, 0.10)], 4 * 3600)
        .expect("tariff should build");
    let export = SparseSeries::constant(0.0, 4 * 3600).expect("tariff should build");
    SignalSnapshot::new().with_price(
        AncillaryCommodity::ActivePowerExternal,
        PriceSignal::new(import, export),
    )
}

/// Flat 0.30 import price with a 1 kW import cap.
pub fn capped_signals() -> SignalSnapshot {
    SignalSnapshot::new()
        .with_price(
            AncillaryCommodity::ActivePowerExternal,
            PriceSignal::flat(0.30, 0.0),
        )
        .with_limit(
            AncillaryCommodity::ActivePowerExternal,
            PowerLimitSignal::constant(1000.0, -1000.0),
        )
}

/// Simulation core over `parts` on the default window with 15-minute steps.
pub fn core_for(
    parts: Vec<ProblemPart>,
    signals: SignalSnapshot,
    penalties: PenaltySettings,
) -> SimulationCore {
    let ctx = default_context();
    SimulationCore::new(
        parts,
        Arc::new(signals),
        SimulationSettings {
            reference_time: ctx.reference_time,
            horizon: ctx.horizon,
            step_size: 900,
            penalties,
        },
    )
    .expect("core should build")
}

/// Small, sequential optimizer configuration.
pub fn small_engine(algorithm: Algorithm, seed: u64) -> EngineSettings {
    EngineSettings {
        algorithm,
        population_size: 16,
        seed,
        parallel: false,
        stopping: StoppingRule {
            max_generations: Some(30),
            plateau_generations: None,
            ..StoppingRule::default()
        },
        ..EngineSettings::default()
    }
}
