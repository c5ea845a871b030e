//! Home energy management scheduler.
//!
//! Devices describe themselves as problem parts; a genetic optimizer
//! searches their joint decision encoding against a step-wise simulation
//! of the household's meter, and the coordinator publishes the winning
//! schedule back to every device.

pub mod commodity;
pub mod config;
pub mod coordinator;
pub mod devices;
pub mod diagnostics;
pub mod error;
/// Genetic optimizer: encodings, operators and the engine variants.
pub mod ga;
/// Export of schedules, balances and diagnostics.
pub mod io {
    pub mod export;
}
pub mod problem;
pub mod profile;
pub mod runner;
/// Time series over integer seconds.
pub mod series;
/// Simulation core, signals, objectives and KPIs.
pub mod sim;
