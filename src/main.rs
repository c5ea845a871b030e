//! hems-sched entry point: CLI wiring and scenario execution.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hems_sched::config::ScenarioConfig;
use hems_sched::diagnostics::DiagnosticsSink;
use hems_sched::ga::Algorithm;
use hems_sched::io::export::{
    CsvDiagnosticsSink, export_schedule_csv, export_schedules_json, write_balances_csv,
};
use hems_sched::runner::{ScenarioRun, run_scenario};

/// Home energy management scheduler.
///
/// If no --scenario or --preset is given, the baseline preset is used.
#[derive(Parser, Debug)]
#[command(name = "hems-sched", version)]
struct Cli {
    /// Load scenario from TOML config file.
    #[arg(long, conflicts_with = "preset")]
    scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, self_consumption, thermal).
    #[arg(long)]
    preset: Option<String>,

    /// Override the device prediction seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the optimizer seed.
    #[arg(long)]
    optimizer_seed: Option<u64>,

    /// Override the number of scheduling cycles.
    #[arg(long)]
    cycles: Option<usize>,

    /// Override the optimizer variant (single, nsga2, archive).
    #[arg(long)]
    algorithm: Option<Algorithm>,

    /// Override the generation limit.
    #[arg(long)]
    max_generations: Option<usize>,

    /// Stream per-generation diagnostics to CSV.
    #[arg(long)]
    diagnostics_out: Option<PathBuf>,

    /// Write the final schedules; `.json` writes JSON, anything else CSV.
    #[arg(long)]
    schedule_out: Option<PathBuf>,

    /// Write the meter balances of the last cycle to CSV.
    #[arg(long)]
    balances_out: Option<PathBuf>,

    /// Only print the summary line of each cycle.
    #[arg(long)]
    quiet: bool,
}

fn load_scenario(cli: &Cli) -> ScenarioConfig {
    let loaded = if let Some(ref path) = cli.scenario {
        ScenarioConfig::from_toml_file(path)
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::baseline())
    };
    let mut scenario = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(seed) = cli.seed {
        scenario.simulation.seed = seed;
    }
    if let Some(seed) = cli.optimizer_seed {
        scenario.optimizer.seed = seed;
    }
    if let Some(cycles) = cli.cycles {
        scenario.simulation.cycles = cycles;
    }
    if let Some(algorithm) = cli.algorithm {
        scenario.optimizer.algorithm = algorithm;
    }
    if let Some(max_generations) = cli.max_generations {
        scenario.optimizer.stopping.max_generations = Some(max_generations);
    }
    scenario
}

fn write_outputs(cli: &Cli, scenario: &ScenarioConfig, run: &ScenarioRun) {
    if let Some(ref path) = cli.schedule_out {
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let result = if is_json {
            export_schedules_json(&run.schedules, path)
        } else {
            export_schedule_csv(&run.schedules, scenario.coordinator.step_size, path)
        };
        if let Err(e) = result {
            eprintln!("error: failed to write schedules: {e}");
            process::exit(1);
        }
        eprintln!("Schedules written to {}", path.display());
    }

    if let Some(ref path) = cli.balances_out {
        let Some(last) = run.reports.last() else {
            return;
        };
        let result = std::fs::File::create(path)
            .map_err(Into::into)
            .and_then(|file| write_balances_csv(&last.balances, std::io::BufWriter::new(file)));
        if let Err(e) = result {
            eprintln!("error: failed to write balances: {e}");
            process::exit(1);
        }
        eprintln!("Balances written to {}", path.display());
    }

    if let Some(ref path) = cli.diagnostics_out {
        eprintln!("Diagnostics written to {}", path.display());
    }
}

fn diagnostics_sink(path: &Path) -> Box<dyn DiagnosticsSink> {
    match CsvDiagnosticsSink::create(path) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            eprintln!("error: cannot create {}: {e}", path.display());
            process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let scenario = load_scenario(&cli);
    let sink = cli.diagnostics_out.as_deref().map(diagnostics_sink);

    let run = match run_scenario(&scenario, sink, !cli.quiet) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    for report in &run.reports {
        println!(
            "cycle={} time={} fitness={:.6} generations={} evaluations={}",
            report.cycle,
            report.reference_time,
            report.objectives.scalar(),
            report.generations,
            report.evaluations
        );
    }
    println!("total_fitness={:.6}", run.total_fitness());

    write_outputs(&cli, &scenario, &run);
}
