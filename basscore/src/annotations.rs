//! Annotation store — chord labels, root frequencies, and enabled flags
//! for the current bar sequence.
//!
//! The store hands out immutable `Arc<[Segment]>` snapshots. Every mutation
//! builds a fresh sequence and swaps it in whole, so a reader holding a
//! snapshot never observes a half-applied update.

use std::sync::Arc;

use thiserror::Error;

use crate::segment::Segment;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("bar index {index} out of range (have {len} bars)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A chord/root estimate for one bar, as produced by an [`Analyzer`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChordEstimate {
    pub index: usize,
    pub chord: String,
    pub frequency: f64,
}

/// Anything that can produce chord estimates for a bar sequence. The
/// engine only merges results; whether they come from a human, a fixed
/// table, or a real detector is the implementor's business.
pub trait Analyzer {
    fn analyze(&self, segments: &[Segment]) -> Vec<ChordEstimate>;
}

/// Counts reported by [`AnnotationStore::apply_analysis`]. Estimates for
/// bars that no longer exist are dropped, not treated as a failure —
/// analysis results may legitimately race a track reload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Applied {
    pub applied: usize,
    pub out_of_range: usize,
}

pub struct AnnotationStore {
    segments: Arc<[Segment]>,
}

impl AnnotationStore {
    pub fn empty() -> Self {
        Self { segments: Arc::from(Vec::new()) }
    }

    /// Take ownership of a freshly built bar sequence.
    pub fn seed(segments: Vec<Segment>) -> Self {
        Self { segments: segments.into() }
    }

    /// Cheap shareable snapshot of the current sequence.
    pub fn snapshot(&self) -> Arc<[Segment]> {
        Arc::clone(&self.segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Flip the enabled flag of exactly the bar at `index`. Every other
    /// field of every bar is carried over untouched.
    pub fn toggle_enabled(&mut self, index: usize) -> Result<Arc<[Segment]>, AnnotationError> {
        if index >= self.segments.len() {
            return Err(AnnotationError::IndexOutOfRange { index, len: self.segments.len() });
        }
        let mut next = self.segments.to_vec();
        next[index].enabled = !next[index].enabled;
        self.segments = next.into();
        Ok(self.snapshot())
    }

    /// Merge analyzer output into the sequence. Bars not mentioned keep
    /// their current values; estimates for out-of-range bars are counted
    /// and dropped. When several estimates target the same bar the last
    /// one wins.
    pub fn apply_analysis(&mut self, estimates: &[ChordEstimate]) -> (Arc<[Segment]>, Applied) {
        let mut counts = Applied::default();
        let mut next = self.segments.to_vec();
        for est in estimates {
            match next.get_mut(est.index) {
                Some(seg) => {
                    seg.chord = est.chord.clone();
                    seg.frequency = est.frequency.max(0.0);
                    counts.applied += 1;
                }
                None => counts.out_of_range += 1,
            }
        }
        if counts.applied > 0 {
            self.segments = next.into();
        }
        (self.snapshot(), counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{build_segments, SEGMENT_LEN};

    fn store() -> AnnotationStore {
        AnnotationStore::seed(build_segments(16.0, SEGMENT_LEN)) // 4 bars
    }

    #[test]
    fn test_toggle_flips_exactly_one_flag() {
        let mut store = store();
        let before = store.snapshot();
        let after = store.toggle_enabled(1).unwrap();

        assert_eq!(before.len(), after.len());
        assert_eq!(after[1].enabled, !before[1].enabled);
        for i in [0usize, 2, 3] {
            assert_eq!(after[i], before[i]);
        }
        // Only the flag changed on bar 1.
        assert_eq!(after[1].chord, before[1].chord);
        assert_eq!(after[1].frequency, before[1].frequency);
        assert_eq!(after[1].start_time, before[1].start_time);
    }

    #[test]
    fn test_toggle_twice_restores_original() {
        let mut store = store();
        let before = store.snapshot();
        store.toggle_enabled(2).unwrap();
        let after = store.toggle_enabled(2).unwrap();
        assert_eq!(&*before, &*after);
    }

    #[test]
    fn test_toggle_out_of_range_leaves_store_unchanged() {
        let mut store = store();
        let before = store.snapshot();
        let err = store.toggle_enabled(4).unwrap_err();
        assert_eq!(err, AnnotationError::IndexOutOfRange { index: 4, len: 4 });
        assert_eq!(&*before, &*store.snapshot());
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let mut store = store();
        let before = store.snapshot();
        let was_enabled = before[0].enabled;
        store.toggle_enabled(0).unwrap();
        // The old snapshot still shows the old value.
        assert_eq!(before[0].enabled, was_enabled);
    }

    #[test]
    fn test_apply_analysis_merges_and_counts() {
        let mut store = store();
        let estimates = vec![
            ChordEstimate { index: 1, chord: "G".into(), frequency: 98.0 },
            ChordEstimate { index: 9, chord: "X".into(), frequency: 1.0 }, // stale
        ];
        let (snap, counts) = store.apply_analysis(&estimates);
        assert_eq!(counts, Applied { applied: 1, out_of_range: 1 });
        assert_eq!(snap[1].chord, "G");
        assert_eq!(snap[1].frequency, 98.0);
        // Unmentioned bars keep their seed values.
        assert_eq!(snap[0].chord, "C");
        // Enabled flags are untouched by analysis.
        assert!(!snap[0].enabled);
        assert!(snap[1].enabled);
    }

    #[test]
    fn test_apply_analysis_last_estimate_wins() {
        let mut store = store();
        let estimates = vec![
            ChordEstimate { index: 0, chord: "Dm".into(), frequency: 73.4 },
            ChordEstimate { index: 0, chord: "Em".into(), frequency: 82.4 },
        ];
        let (snap, counts) = store.apply_analysis(&estimates);
        assert_eq!(counts.applied, 2);
        assert_eq!(snap[0].chord, "Em");
    }
}
