//! Drives a configured scenario through consecutive scheduling cycles.

use std::fmt;

use thiserror::Error;
use tracing::info;

use crate::config::ScenarioConfig;
use crate::coordinator::{
    CycleReport, DeviceSchedule, ModelController, SchedulingCoordinator,
};
use crate::diagnostics::{DiagnosticsSink, GenerationRecord};
use crate::error::{ConfigError, CoordinatorError, TimeSeriesError};

/// Failure to run a scenario.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid scenario:\n{}", ConfigErrors(.0))]
    Invalid(Vec<ConfigError>),
    #[error("cannot build signals: {0}")]
    Signals(#[from] TimeSeriesError),
    #[error("cycle {cycle} failed: {source}")]
    Cycle {
        cycle: usize,
        #[source]
        source: CoordinatorError,
    },
}

struct ConfigErrors<'a>(&'a [ConfigError]);

impl fmt::Display for ConfigErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

/// Everything a scenario run produced.
#[derive(Debug)]
pub struct ScenarioRun {
    /// One report per cycle, in order.
    pub reports: Vec<CycleReport>,
    /// Plans published in the last cycle, ordered by device id.
    pub schedules: Vec<DeviceSchedule>,
    /// Generation records of all cycles.
    pub diagnostics: Vec<GenerationRecord>,
}

impl ScenarioRun {
    /// Sum of the scalar fitness over all cycles.
    pub fn total_fitness(&self) -> f64 {
        self.reports.iter().map(|r| r.objectives.scalar()).sum()
    }
}

/// Builds a coordinator with every configured device registered.
///
/// # Errors
///
/// Returns `RunError::Invalid` with every validation failure, or
/// `RunError::Signals` if the tariff cannot be built.
pub fn build_coordinator(
    config: &ScenarioConfig,
    sink: Option<Box<dyn DiagnosticsSink>>,
) -> Result<SchedulingCoordinator, RunError> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(RunError::Invalid(errors));
    }

    let signals = config
        .signals
        .snapshot(config.simulation.start_time, config.end_time())?;
    let mut coordinator = SchedulingCoordinator::new(
        config.coordinator.clone(),
        config.optimizer.clone(),
        config.penalties.clone(),
        signals,
    )
    .with_compression(config.compression_policy())
    .with_device_seed(config.simulation.seed);
    if let Some(sink) = sink {
        coordinator = coordinator.with_diagnostics_sink(sink);
    }

    for device in &config.devices {
        coordinator.register(Box::new(ModelController::new(device.clone().into_model())));
    }
    Ok(coordinator)
}

/// Runs `config.simulation.cycles` cycles, one every `period_secs`.
///
/// # Arguments
///
/// * `config` - Scenario to run
/// * `sink` - Optional stream for generation records
/// * `print_readable_log` - Print each cycle report to stdout
///
/// # Errors
///
/// Returns the first configuration or cycle failure.
pub fn run_scenario(
    config: &ScenarioConfig,
    sink: Option<Box<dyn DiagnosticsSink>>,
    print_readable_log: bool,
) -> Result<ScenarioRun, RunError> {
    let coordinator = build_coordinator(config, sink)?;
    let start = config.simulation.start_time;
    let period = config.coordinator.period_secs;

    let mut reports = Vec::with_capacity(config.simulation.cycles);
    for cycle in 0..config.simulation.cycles {
        let now = start + period * cycle as i64;
        let report = coordinator
            .run_cycle(now)
            .map_err(|source| RunError::Cycle { cycle, source })?;
        info!(
            cycle,
            now,
            fitness = report.objectives.scalar(),
            generations = report.generations,
            "cycle finished"
        );
        if print_readable_log {
            println!("{report}");
        }
        reports.push(report);
    }
    coordinator.shutdown();

    Ok(ScenarioRun {
        reports,
        schedules: coordinator.published(),
        diagnostics: coordinator.diagnostics(),
    })
}
