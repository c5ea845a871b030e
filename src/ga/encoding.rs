//! Solution encodings: a bit vector split into per-device segments.

use std::fmt;
use std::ops::Range;

use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::problem::{DeviceId, ProblemPart};

/// A fixed-length bit vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct BitString(Vec<bool>);

impl BitString {
    pub fn new(bits: Vec<bool>) -> Self {
        Self(bits)
    }

    /// All-zero string of `len` bits.
    pub fn zeros(len: usize) -> Self {
        Self(vec![false; len])
    }

    /// Uniformly random string of `len` bits.
    pub fn random(len: usize, rng: &mut StdRng) -> Self {
        Self((0..len).map(|_| rng.random::<bool>()).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bits(&self) -> &[bool] {
        &self.0
    }

    pub fn bits_mut(&mut self) -> &mut [bool] {
        &mut self.0
    }

    /// Flips bit `i`.
    pub fn flip(&mut self, i: usize) {
        self.0[i] = !self.0[i];
    }

    /// Number of positions at which `self` and `other` differ.
    pub fn hamming(&self, other: &BitString) -> usize {
        self.0
            .iter()
            .zip(&other.0)
            .filter(|(a, b)| a != b)
            .count()
            + self.0.len().abs_diff(other.0.len())
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            f.write_str(if b { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Where each device's segment lives inside an encoding.
///
/// Segments are contiguous and ordered by ascending device id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SegmentLayout {
    segments: Vec<(DeviceId, Range<usize>)>,
    total: usize,
}

impl SegmentLayout {
    /// Builds a layout from `(device, bit length)` pairs, sorting by device id.
    pub fn new(mut lengths: Vec<(DeviceId, usize)>) -> Self {
        lengths.sort_by(|a, b| a.0.cmp(&b.0));
        let mut offset = 0;
        let segments = lengths
            .into_iter()
            .map(|(id, len)| {
                let range = offset..offset + len;
                offset += len;
                (id, range)
            })
            .collect();
        Self {
            segments,
            total: offset,
        }
    }

    /// Layout of the given parts.
    pub fn for_parts(parts: &[ProblemPart]) -> Self {
        Self::new(
            parts
                .iter()
                .map(|p| (p.device_id().clone(), p.encoded_segment_length()))
                .collect(),
        )
    }

    /// Total encoding length in bits.
    pub fn total_len(&self) -> usize {
        self.total
    }

    /// Bit range of `device`, if registered.
    pub fn range(&self, device: &DeviceId) -> Option<Range<usize>> {
        self.segments
            .iter()
            .find(|(id, _)| id == device)
            .map(|(_, r)| r.clone())
    }

    /// Segments in layout order.
    pub fn segments(&self) -> impl Iterator<Item = (&DeviceId, Range<usize>)> {
        self.segments.iter().map(|(id, r)| (id, r.clone()))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_orders_by_device_id() {
        let layout = SegmentLayout::new(vec![
            (DeviceId::new("washer"), 9),
            (DeviceId::new("battery"), 4),
            (DeviceId::new("pv"), 0),
        ]);
        assert_eq!(layout.total_len(), 13);
        assert_eq!(layout.range(&DeviceId::new("battery")), Some(0..4));
        assert_eq!(layout.range(&DeviceId::new("pv")), Some(4..4));
        assert_eq!(layout.range(&DeviceId::new("washer")), Some(4..13));
        assert_eq!(layout.range(&DeviceId::new("tank")), None);
    }

    #[test]
    fn test_hamming_and_display() {
        let a = BitString::new(vec![true, false, true]);
        let b = BitString::new(vec![true, true, false]);
        assert_eq!(a.hamming(&b), 2);
        assert_eq!(a.to_string(), "101");
    }
}
