//! Bar segmentation — partitions a track into fixed-length time slices.

use serde::{Deserialize, Serialize};

/// Length of one bar in seconds. Tracks are cut into consecutive bars of
/// exactly this length; a trailing remainder shorter than one bar is not
/// represented.
pub const SEGMENT_LEN: f64 = 4.0;

/// Seed chord labels, cycled by bar index until an analyzer runs.
const SEED_CHORDS: [&str; 4] = ["C", "G", "Am", "F"];
/// Root frequencies (Hz) matching `SEED_CHORDS`.
const SEED_FREQS: [f64; 4] = [65.4, 98.0, 110.0, 87.3];

/// One fixed-length bar of the loaded track: a half-open time range
/// `[start_time, end_time)` carrying a chord annotation, a root frequency,
/// and an enabled flag for the sub-bass layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Position in the bar sequence. Assigned at build time, never changes.
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
    /// Chord label ("C", "Am", ...). Seeded, later overwritten by analysis.
    pub chord: String,
    /// Chord root frequency in Hz. `0.0` means unknown.
    pub frequency: f64,
    pub enabled: bool,
}

impl Segment {
    /// Whether `time` falls inside this bar's half-open range.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time
    }
}

/// Partition `duration` seconds into consecutive bars of `segment_len`
/// seconds each. Yields `floor(duration / segment_len)` bars — a track
/// shorter than one bar yields none.
///
/// Seeding is deterministic: chords and frequencies cycle through a fixed
/// four-bar pattern, and every third bar starts disabled. These are
/// placeholders for display until real analysis results are merged in.
pub fn build_segments(duration: f64, segment_len: f64) -> Vec<Segment> {
    if !duration.is_finite() || !segment_len.is_finite() || segment_len <= 0.0 {
        return Vec::new();
    }
    // Float-to-usize casts saturate, so a negative duration yields 0 bars.
    let count = (duration / segment_len).floor() as usize;
    (0..count)
        .map(|i| Segment {
            index: i,
            start_time: i as f64 * segment_len,
            end_time: (i + 1) as f64 * segment_len,
            chord: SEED_CHORDS[i % SEED_CHORDS.len()].to_string(),
            frequency: SEED_FREQS[i % SEED_FREQS.len()],
            enabled: i % 3 != 0,
        })
        .collect()
}
