//! Error types shared across the scheduling core.

use thiserror::Error;

/// Arithmetic or access failure on a time series or load profile.
///
/// These indicate an inconsistent model rather than bad external input, so
/// callers propagate them instead of trying to recover.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeSeriesError {
    /// Read or write outside `[0, length)` of a dense series.
    #[error("time {time}s is outside the series bounds [0, {length})")]
    OutOfRange { time: i64, length: i64 },
    /// Operation that the series variant does not implement.
    #[error("operation `{0}` is not supported by sparse series")]
    Unsupported(&'static str),
    /// Dense operands with different cell widths, or an unaligned offset.
    #[error("resolution mismatch: {left}s vs {right}s at offset {offset}s")]
    ResolutionMismatch { left: i64, right: i64, offset: i64 },
    /// NaN or infinite value written into a series.
    #[error("non-finite value {value} at time {time}s")]
    NonFinite { time: i64, value: f64 },
    /// Range with `from > to`.
    #[error("invalid range [{from}, {to})")]
    InvalidRange { from: i64, to: i64 },
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.step_size"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    /// Creates a configuration error for `field`.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Failure to serialize decision variables into an encoding segment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("decision variables of kind `{actual}` do not fit a `{expected}` segment")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("start time {start}s is outside the window [{earliest}, {latest}]")]
    OutOfWindow {
        start: i64,
        earliest: i64,
        latest: i64,
    },
    #[error("start time {start}s is not aligned to the {resolution}s grid")]
    Misaligned { start: i64, resolution: i64 },
    #[error("expected {expected} slots, got {actual}")]
    SlotCount { expected: usize, actual: usize },
}

/// Lifecycle or model failure of a single problem part.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProblemPartError {
    #[error("part `{device}` cannot {action} while {state}")]
    InvalidState {
        device: String,
        action: &'static str,
        state: &'static str,
    },
    #[error("part `{device}` expects {expected} encoding bits, got {actual}")]
    SegmentLength {
        device: String,
        expected: usize,
        actual: usize,
    },
    #[error("part `{device}`: {message}")]
    Model { device: String, message: String },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Series(#[from] TimeSeriesError),
}

/// Failure while evaluating one candidate encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("encoding has {actual} bits, layout expects {expected}")]
    EncodingLength { expected: usize, actual: usize },
    #[error(
        "invalid simulation window: reference {reference_time}s, horizon {horizon}s, step {step_size}s"
    )]
    InvalidWindow {
        reference_time: i64,
        horizon: i64,
        step_size: i64,
    },
    #[error("part `{device}` starts at {part_reference}s but the run starts at {reference_time}s")]
    MisalignedPart {
        device: String,
        part_reference: i64,
        reference_time: i64,
    },
    #[error(transparent)]
    Part(#[from] ProblemPartError),
    #[error(transparent)]
    Series(#[from] TimeSeriesError),
}

/// Failure of a scheduling cycle.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("no problem parts are registered")]
    NoParts,
    #[error("coordinator has been shut down")]
    ShutDown,
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Part(#[from] ProblemPartError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience alias for time-series results.
pub type SeriesResult<T> = std::result::Result<T, TimeSeriesError>;

/// Result of coordinator-level operations.
pub type Result<T, E = CoordinatorError> = std::result::Result<T, E>;
