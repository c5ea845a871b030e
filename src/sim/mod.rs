//! Simulation core: steps all problem parts together and prices the result.

pub mod clock;
pub mod core;
pub mod kpi;
pub mod meter;
pub mod objective;
pub mod signals;

pub use self::core::{AncillaryBalances, Evaluation, SimulationCore, SimulationSettings};
pub use kpi::KpiReport;
pub use meter::AncillaryMeterState;
pub use objective::{Objectives, PenaltySettings};
pub use signals::{PowerLimitSignal, PriceSignal, SignalSnapshot};
