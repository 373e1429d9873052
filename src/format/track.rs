//! Animation track sequences.
//!
//! One animated property holds, per animation sequence, a list of
//! timestamps and a list of values of equal length. The whole track shares
//! a single interpolation mode and an optional global sequence id.
//!
//! On disk a track is a 20-byte header:
//!
//! ```text
//! interpolation u16 | global_sequence u16 | timestamps {count, offset} | values {count, offset}
//! ```
//!
//! where each `{count, offset}` points at an array of per-sequence array
//! headers, which in turn point at the key data.

use serde::{Deserialize, Serialize};

use super::array::{ArraySlot, Record};
use super::deferred::DeferredBuffer;
use crate::util::{Encodable, Error, Result};

/// Global sequence id meaning "timing is private to each animation".
pub const NO_GLOBAL_SEQUENCE: u16 = u16::MAX;

/// Size of an encoded track header.
pub const TRACK_HEADER_SIZE: usize = 20;

/// Keyframe interpolation mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum Interpolation {
    #[default]
    None = 0,
    Linear = 1,
    Bezier = 2,
    Hermite = 3,
}

/// Per-sequence keyframes for one animated property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "TrackRepr<T>", into = "TrackRepr<T>")]
#[serde(bound(deserialize = "T: Deserialize<'de> + Clone", serialize = "T: Serialize + Clone"))]
pub struct TrackSequences<T> {
    interpolation: Interpolation,
    global_sequence: u16,
    timestamps: Vec<Vec<u32>>,
    values: Vec<Vec<T>>,
    rejected: Vec<String>,
}

impl<T> Default for TrackSequences<T> {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::None,
            global_sequence: NO_GLOBAL_SEQUENCE,
            timestamps: Vec::new(),
            values: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<T> TrackSequences<T> {
    /// Create an empty track with the given interpolation.
    pub fn new(interpolation: Interpolation) -> Self {
        Self {
            interpolation,
            ..Self::default()
        }
    }

    /// Set the shared global sequence id.
    pub fn with_global_sequence(mut self, id: u16) -> Self {
        self.global_sequence = id;
        self
    }

    /// Track interpolation mode.
    #[inline]
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Global sequence id, or [`NO_GLOBAL_SEQUENCE`].
    #[inline]
    pub fn global_sequence(&self) -> u16 {
        self.global_sequence
    }

    /// Number of sequences.
    #[inline]
    pub fn sequence_count(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if no sequence was created.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Timestamps of sequence `index`.
    pub fn timestamps(&self, index: usize) -> Option<&[u32]> {
        self.timestamps.get(index).map(Vec::as_slice)
    }

    /// Values of sequence `index`.
    pub fn values(&self, index: usize) -> Option<&[T]> {
        self.values.get(index).map(Vec::as_slice)
    }

    /// Edits rejected while building this track from serialized input.
    #[inline]
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    /// Start a new sequence and return its index.
    pub fn add_sequence(&mut self) -> usize {
        self.timestamps.push(Vec::new());
        self.values.push(Vec::new());
        self.timestamps.len() - 1
    }

    /// Append a key to sequence `index`.
    pub fn add_value(&mut self, index: usize, timestamp: u32, value: T) -> Result<()> {
        self.check_index(index)?;
        self.timestamps[index].push(timestamp);
        self.values[index].push(value);
        Ok(())
    }

    /// Append a key to the most recently created sequence.
    pub fn add_value_to_last_sequence(&mut self, timestamp: u32, value: T) -> Result<()> {
        let last = self.timestamps.len().checked_sub(1).ok_or(Error::NoSequences)?;
        self.add_value(last, timestamp, value)
    }

    #[inline]
    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.timestamps.len() {
            return Err(Error::SequenceOutOfRange {
                index,
                count: self.timestamps.len(),
            });
        }
        Ok(())
    }
}

impl<T: Clone> TrackSequences<T> {
    /// Track with one sequence holding a single key at time 0.
    pub fn constant(value: T) -> Self {
        let mut track = Self::new(Interpolation::None);
        track.timestamps.push(vec![0]);
        track.values.push(vec![value]);
        track
    }

    /// Repeat the first value of sequence `index` at `timestamp`.
    ///
    /// Holds a value until the end of an animation.
    pub fn replicate_first_value_to_end(&mut self, index: usize, timestamp: u32) -> Result<()> {
        self.check_index(index)?;
        let first = self.values[index]
            .first()
            .cloned()
            .ok_or(Error::NoFirstValue { index })?;
        self.timestamps[index].push(timestamp);
        self.values[index].push(first);
        Ok(())
    }
}

/// Slots reserved by [`TrackSequences::write_header`].
#[derive(Debug)]
#[must_use = "track slots must be resolved by write_data"]
pub struct TrackSlots {
    timestamps: ArraySlot,
    values: ArraySlot,
}

impl<T: Encodable> TrackSequences<T> {
    /// Write the 20-byte header, reserving both outer arrays.
    pub fn write_header(&self, buf: &mut DeferredBuffer) -> Result<TrackSlots> {
        buf.put_u16(self.interpolation as u16)?;
        buf.put_u16(self.global_sequence)?;
        let timestamps = ArraySlot::reserve(buf);
        let values = ArraySlot::reserve(buf);
        Ok(TrackSlots { timestamps, values })
    }

    /// Append sub-headers and key data, then resolve `slots`.
    ///
    /// Layout: timestamp sub-headers, value sub-headers, each timestamp
    /// block, each value block. Key blocks are aligned to `alignment`.
    pub fn write_data(&self, slots: TrackSlots, buf: &mut DeferredBuffer, alignment: usize) -> Result<()> {
        let n = self.timestamps.len();

        slots.timestamps.begin_data(buf, n, alignment)?;
        let ts_slots: Vec<ArraySlot> = (0..n).map(|_| ArraySlot::reserve(buf)).collect();
        slots.values.begin_data(buf, n, 4)?;
        let value_slots: Vec<ArraySlot> = (0..n).map(|_| ArraySlot::reserve(buf)).collect();

        for (slot, keys) in ts_slots.into_iter().zip(&self.timestamps) {
            slot.begin_data(buf, keys.len(), alignment)?;
            for t in keys {
                buf.put_u32(*t)?;
            }
        }
        for (slot, keys) in value_slots.into_iter().zip(&self.values) {
            slot.begin_data(buf, keys.len(), alignment)?;
            for v in keys {
                buf.put(v)?;
            }
        }
        Ok(())
    }
}

impl<T: Encodable> Record for TrackSequences<T> {
    const RECORD_SIZE: usize = TRACK_HEADER_SIZE;
    type Pending = TrackSlots;

    fn write_record(&self, buf: &mut DeferredBuffer) -> Result<TrackSlots> {
        self.write_header(buf)
    }

    fn write_payload(&self, pending: TrackSlots, buf: &mut DeferredBuffer, alignment: usize) -> Result<()> {
        self.write_data(pending, buf, alignment)
    }
}

/// Serialized form: keys per sequence, replayed through the edit operations.
#[derive(Serialize, Deserialize)]
struct TrackRepr<T> {
    #[serde(default)]
    interpolation: Interpolation,
    #[serde(default = "no_global_sequence")]
    global_sequence: u16,
    #[serde(default = "Vec::new")]
    sequences: Vec<SequenceRepr<T>>,
}

#[derive(Serialize, Deserialize)]
struct SequenceRepr<T> {
    #[serde(default = "Vec::new")]
    keys: Vec<(u32, T)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hold_until: Option<u32>,
}

fn no_global_sequence() -> u16 {
    NO_GLOBAL_SEQUENCE
}

impl<T: Clone> From<TrackRepr<T>> for TrackSequences<T> {
    fn from(repr: TrackRepr<T>) -> Self {
        let mut track = Self::new(repr.interpolation).with_global_sequence(repr.global_sequence);
        for seq in repr.sequences {
            let index = track.add_sequence();
            for (timestamp, value) in seq.keys {
                if let Err(e) = track.add_value(index, timestamp, value) {
                    track.rejected.push(format!("add_value: {}", e));
                }
            }
            if let Some(end) = seq.hold_until {
                if let Err(e) = track.replicate_first_value_to_end(index, end) {
                    track.rejected.push(format!("replicate_first_value_to_end: {}", e));
                }
            }
        }
        track
    }
}

impl<T> From<TrackSequences<T>> for TrackRepr<T> {
    fn from(track: TrackSequences<T>) -> Self {
        let sequences = track
            .timestamps
            .into_iter()
            .zip(track.values)
            .map(|(ts, vs)| SequenceRepr {
                keys: ts.into_iter().zip(vs).collect(),
                hold_until: None,
            })
            .collect();
        Self {
            interpolation: track.interpolation,
            global_sequence: track.global_sequence,
            sequences,
        }
    }
}
