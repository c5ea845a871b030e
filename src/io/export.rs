//! CSV and JSON export for optimizer diagnostics and published schedules.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::commodity::AncillaryCommodity;
use crate::coordinator::DeviceSchedule;
use crate::diagnostics::{DiagnosticsSink, GenerationRecord};
use crate::error::TimeSeriesError;
use crate::series::TimeSeries;
use crate::sim::AncillaryBalances;

/// Failure while writing an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Series(#[from] TimeSeriesError),
}

/// Column header of the diagnostics CSV.
const DIAGNOSTICS_HEADER: &str = "run_id,generation,evaluations,failed_evaluations,\
                                  best_fitness,worst_fitness,mean_fitness,fitness_spread,\
                                  homogeneity,best_objectives,worst_objectives";

/// Column header of the per-step schedule CSV.
const SCHEDULE_HEADER: &str = "device,cycle,time_s,commodity,power_w";

/// Column header of the per-step meter CSV.
const BALANCE_HEADER: &str = "time_s,commodity,power_w";

fn join_axes(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:.6}"))
        .collect::<Vec<_>>()
        .join(";")
}

fn diagnostics_row(record: &GenerationRecord) -> [String; 11] {
    [
        record.run_id.to_string(),
        record.generation.to_string(),
        record.evaluations.to_string(),
        record.failed_evaluations.to_string(),
        format!("{:.6}", record.best_fitness),
        format!("{:.6}", record.worst_fitness),
        format!("{:.6}", record.mean_fitness),
        format!("{:.6}", record.fitness_spread),
        format!("{:.4}", record.homogeneity),
        join_axes(&record.best_objectives),
        join_axes(&record.worst_objectives),
    ]
}

/// Writes generation records as CSV to any writer.
///
/// Objective vectors are written `;`-separated in a single column.
///
/// # Errors
///
/// Returns an `ExportError` if writing fails.
pub fn write_diagnostics_csv(
    records: &[GenerationRecord],
    writer: impl Write,
) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(DIAGNOSTICS_HEADER.split(',').map(str::trim))?;
    for record in records {
        wtr.write_record(&diagnostics_row(record))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Exports generation records to a CSV file at `path`.
///
/// # Errors
///
/// Returns an `ExportError` if file creation or writing fails.
pub fn export_diagnostics_csv(records: &[GenerationRecord], path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_diagnostics_csv(records, io::BufWriter::new(file))
}

/// Writes published schedules as CSV, one row per device, step and commodity.
///
/// Each row carries the average power of the commodity over the step.
/// Times are absolute seconds.
///
/// # Arguments
///
/// * `schedules` - Published device schedules
/// * `step_size` - Sampling width in seconds
/// * `writer` - Destination implementing `Write`
///
/// # Errors
///
/// Returns an `ExportError` if writing fails or a profile cannot be sampled.
pub fn write_schedule_csv(
    schedules: &[DeviceSchedule],
    step_size: i64,
    writer: impl Write,
) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(SCHEDULE_HEADER.split(','))?;
    let step = step_size.max(1);
    for published in schedules {
        let profile = published.schedule.profile();
        for commodity in profile.commodities() {
            let mut t = 0;
            while t < profile.end_time() {
                let to = (t + step).min(profile.end_time());
                let power = profile.average_load(commodity, t, to)?;
                wtr.write_record(&[
                    published.device_id.to_string(),
                    published.cycle.to_string(),
                    (published.reference_time + t).to_string(),
                    commodity.to_string(),
                    format!("{power:.4}"),
                ])?;
                t = to;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Exports published schedules to a CSV file at `path`.
///
/// # Errors
///
/// Returns an `ExportError` if file creation or writing fails.
pub fn export_schedule_csv(
    schedules: &[DeviceSchedule],
    step_size: i64,
    path: &Path,
) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_schedule_csv(schedules, step_size, io::BufWriter::new(file))
}

/// Writes the per-step meter balances of an evaluation as CSV.
///
/// # Errors
///
/// Returns an `ExportError` if writing fails.
pub fn write_balances_csv(balances: &AncillaryBalances, writer: impl Write) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(BALANCE_HEADER.split(','))?;
    for commodity in AncillaryCommodity::ALL {
        let series = balances.series(commodity);
        let step = series.resolution();
        let mut t = 0;
        while t < series.length() {
            let value = series.get(t)?;
            wtr.write_record(&[
                (balances.reference_time() + t).to_string(),
                commodity.to_string(),
                format!("{value:.4}"),
            ])?;
            t += step;
        }
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct SchedulesDocument<'a> {
    schedules: &'a [DeviceSchedule],
}

/// Writes published schedules as a pretty-printed JSON document.
///
/// # Errors
///
/// Returns an `ExportError` if serialization or writing fails.
pub fn write_schedules_json(schedules: &[DeviceSchedule], writer: impl Write) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, &SchedulesDocument { schedules })?;
    Ok(())
}

/// Exports published schedules to a JSON file at `path`.
///
/// # Errors
///
/// Returns an `ExportError` if file creation or writing fails.
pub fn export_schedules_json(schedules: &[DeviceSchedule], path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let mut buf = io::BufWriter::new(file);
    write_schedules_json(schedules, &mut buf)?;
    buf.flush()?;
    Ok(())
}

/// Streams generation records into a CSV file as they are produced.
pub struct CsvDiagnosticsSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvDiagnosticsSink<W> {
    /// Wraps `writer` and writes the header row.
    ///
    /// # Errors
    ///
    /// Returns an `ExportError` if the header cannot be written.
    pub fn new(writer: W) -> Result<Self, ExportError> {
        let mut writer = csv::WriterBuilder::new().from_writer(writer);
        writer.write_record(DIAGNOSTICS_HEADER.split(',').map(str::trim))?;
        Ok(Self { writer })
    }
}

impl CsvDiagnosticsSink<io::BufWriter<File>> {
    /// Creates (or truncates) the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an `ExportError` if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, ExportError> {
        Self::new(io::BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> std::fmt::Debug for CsvDiagnosticsSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvDiagnosticsSink").finish_non_exhaustive()
    }
}

impl<W: Write + Send> DiagnosticsSink for CsvDiagnosticsSink<W> {
    fn record(&mut self, record: &GenerationRecord) -> Result<(), ExportError> {
        self.writer.write_record(&diagnostics_row(record))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commodity::Commodity;
    use crate::problem::{DecisionVariables, DeviceId};
    use crate::profile::{LoadProfile, Schedule};

    fn record(generation: usize) -> GenerationRecord {
        GenerationRecord {
            run_id: 7,
            generation,
            evaluations: 10 * (generation + 1),
            failed_evaluations: 0,
            best_fitness: 1.5,
            worst_fitness: 4.0,
            mean_fitness: 2.25,
            fitness_spread: 2.5,
            homogeneity: 0.3,
            best_objectives: vec![1.0, 0.5],
            worst_objectives: vec![3.0, 1.0],
        }
    }

    fn published() -> DeviceSchedule {
        let mut profile = LoadProfile::new(1800);
        profile.set_load(Commodity::ActivePower, 0, 100.0).ok();
        profile.set_load(Commodity::ActivePower, 900, 300.0).ok();
        DeviceSchedule {
            device_id: DeviceId::new("washer"),
            cycle: 1,
            reference_time: 3600,
            decisions: DecisionVariables::StartTime { start: 3600 },
            schedule: Schedule::new(profile, 0.25, "appliance:washer"),
        }
    }

    #[test]
    fn test_diagnostics_header_and_rows() {
        let records: Vec<GenerationRecord> = (0..3).map(record).collect();
        let mut buf = Vec::new();
        write_diagnostics_csv(&records, &mut buf).ok();
        let output = String::from_utf8(buf).unwrap_or_default();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("run_id,generation,evaluations"));
        assert!(lines[1].ends_with("1.000000;0.500000,3.000000;1.000000"));
    }

    #[test]
    fn test_sink_matches_batch_export() {
        let records: Vec<GenerationRecord> = (0..2).map(record).collect();
        let mut batch = Vec::new();
        write_diagnostics_csv(&records, &mut batch).ok();

        let mut streamed = Vec::new();
        {
            let mut sink = CsvDiagnosticsSink::new(&mut streamed).ok();
            for r in &records {
                assert!(sink.as_mut().map(|s| s.record(r).is_ok()).unwrap_or(false));
            }
            assert!(sink.as_mut().map(|s| s.flush().is_ok()).unwrap_or(false));
        }
        assert_eq!(batch, streamed);
    }

    #[test]
    fn test_schedule_rows_are_step_averages() {
        let mut buf = Vec::new();
        write_schedule_csv(&[published()], 1800, &mut buf).ok();
        let output = String::from_utf8(buf).unwrap_or_default();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], SCHEDULE_HEADER);
        assert_eq!(lines[1], "washer,1,3600,active_power,200.0000");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_schedules_json_is_parseable() {
        let mut buf = Vec::new();
        write_schedules_json(&[published()], &mut buf).ok();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap_or_default();
        assert_eq!(value["schedules"][0]["device_id"], "washer");
        assert_eq!(value["schedules"][0]["cycle"], 1);
    }
}
