//! Typed decision variables and their bit-level segment codecs.
//!
//! Devices reason about [`DecisionVariables`]; bits only appear at the
//! genetic-operator boundary, through a [`SegmentCodec`].

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Operating mode of a storage device for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Idle,
    Charge,
    Discharge,
}

/// Decoded decisions of one device.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionVariables {
    /// Nothing to decide.
    #[default]
    None,
    /// Absolute start time in seconds.
    StartTime { start: i64 },
    /// One on/off request per slot.
    SlotFlags { flags: Vec<bool> },
    /// One storage mode per slot.
    SlotModes { modes: Vec<StorageMode> },
}

impl DecisionVariables {
    /// Variant name, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            DecisionVariables::None => "none",
            DecisionVariables::StartTime { .. } => "start_time",
            DecisionVariables::SlotFlags { .. } => "slot_flags",
            DecisionVariables::SlotModes { .. } => "slot_modes",
        }
    }
}

/// Bit layout of one device's encoding segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentCodec {
    /// Zero-length segment.
    Empty,
    /// A start position on a `resolution`-second grid in `[earliest, latest]`,
    /// stored as a big-endian index. Indices past the last position are
    /// clipped to `latest`.
    StartTime {
        earliest: i64,
        latest: i64,
        resolution: i64,
    },
    /// One bit per slot.
    SlotFlags { slots: usize },
    /// Two bits per slot: `00` idle, `01` charge, `10` discharge, `11` idle.
    SlotModes { slots: usize },
}

impl SegmentCodec {
    fn kind(&self) -> &'static str {
        match self {
            SegmentCodec::Empty => "none",
            SegmentCodec::StartTime { .. } => "start_time",
            SegmentCodec::SlotFlags { .. } => "slot_flags",
            SegmentCodec::SlotModes { .. } => "slot_modes",
        }
    }

    /// Number of representable start positions (1 for other codecs).
    pub fn positions(&self) -> u64 {
        match *self {
            SegmentCodec::StartTime {
                earliest,
                latest,
                resolution,
            } if latest >= earliest && resolution > 0 => ((latest - earliest) / resolution) as u64 + 1,
            _ => 1,
        }
    }

    /// Length of the segment in bits.
    pub fn bit_len(&self) -> usize {
        match *self {
            SegmentCodec::Empty => 0,
            SegmentCodec::StartTime { .. } => {
                let positions = self.positions();
                if positions <= 1 {
                    0
                } else {
                    (u64::BITS - (positions - 1).leading_zeros()) as usize
                }
            }
            SegmentCodec::SlotFlags { slots } => slots,
            SegmentCodec::SlotModes { slots } => 2 * slots,
        }
    }

    /// Decodes a segment of exactly [`bit_len`](Self::bit_len) bits.
    pub fn decode(&self, bits: &[bool]) -> DecisionVariables {
        match *self {
            SegmentCodec::Empty => DecisionVariables::None,
            SegmentCodec::StartTime {
                earliest,
                resolution,
                ..
            } => {
                let index = bits.iter().fold(0u64, |acc, &b| (acc << 1) | u64::from(b));
                let index = index.min(self.positions() - 1);
                DecisionVariables::StartTime {
                    start: earliest + index as i64 * resolution,
                }
            }
            SegmentCodec::SlotFlags { .. } => DecisionVariables::SlotFlags {
                flags: bits.to_vec(),
            },
            SegmentCodec::SlotModes { .. } => DecisionVariables::SlotModes {
                modes: bits
                    .chunks_exact(2)
                    .map(|pair| match (pair[0], pair[1]) {
                        (false, true) => StorageMode::Charge,
                        (true, false) => StorageMode::Discharge,
                        _ => StorageMode::Idle,
                    })
                    .collect(),
            },
        }
    }

    /// Encodes decision variables into a fresh segment.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the variant does not match the codec, a
    /// start time is off-grid or outside the window, or a slot count differs.
    pub fn encode(&self, vars: &DecisionVariables) -> Result<Vec<bool>, CodecError> {
        match (*self, vars) {
            (SegmentCodec::Empty, DecisionVariables::None) => Ok(Vec::new()),
            (
                SegmentCodec::StartTime {
                    earliest,
                    latest,
                    resolution,
                },
                DecisionVariables::StartTime { start },
            ) => {
                let last = earliest + (self.positions() as i64 - 1) * resolution;
                if *start < earliest || *start > last {
                    return Err(CodecError::OutOfWindow {
                        start: *start,
                        earliest,
                        latest,
                    });
                }
                if (start - earliest) % resolution != 0 {
                    return Err(CodecError::Misaligned {
                        start: *start,
                        resolution,
                    });
                }
                let index = ((start - earliest) / resolution) as u64;
                let len = self.bit_len();
                Ok((0..len).map(|i| (index >> (len - 1 - i)) & 1 == 1).collect())
            }
            (SegmentCodec::SlotFlags { slots }, DecisionVariables::SlotFlags { flags }) => {
                if flags.len() != slots {
                    return Err(CodecError::SlotCount {
                        expected: slots,
                        actual: flags.len(),
                    });
                }
                Ok(flags.clone())
            }
            (SegmentCodec::SlotModes { slots }, DecisionVariables::SlotModes { modes }) => {
                if modes.len() != slots {
                    return Err(CodecError::SlotCount {
                        expected: slots,
                        actual: modes.len(),
                    });
                }
                Ok(modes
                    .iter()
                    .flat_map(|m| match m {
                        StorageMode::Idle => [false, false],
                        StorageMode::Charge => [false, true],
                        StorageMode::Discharge => [true, false],
                    })
                    .collect())
            }
            (codec, vars) => Err(CodecError::KindMismatch {
                expected: codec.kind(),
                actual: vars.kind(),
            }),
        }
    }
}
