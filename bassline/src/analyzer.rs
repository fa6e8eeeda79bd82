//! Chord analysis, simulated.
//!
//! Stands in for a real detector: after a short artificial delay it
//! returns a fixed chord/root table cycled over the bar sequence. Results
//! are delivered over a channel tagged with the session generation so a
//! reload that happens mid-analysis simply orphans them.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use basscore::{Analyzer, ChordEstimate, Segment};

/// Artificial analysis latency, roughly what a real detector would take.
pub const ANALYSIS_DELAY: Duration = Duration::from_secs(2);

/// The detector's fixed answer: chord labels and root frequencies (Hz).
const CHORD_TABLE: [(&str, f64); 4] = [
    ("C", 65.4),
    ("G", 98.0),
    ("Am", 110.0),
    ("F", 87.3),
];

/// Analysis output plus the session generation it was computed against.
pub struct AnalysisResult {
    pub generation: u64,
    pub estimates: Vec<ChordEstimate>,
}

pub struct SimulatedAnalyzer;

impl Analyzer for SimulatedAnalyzer {
    fn analyze(&self, segments: &[Segment]) -> Vec<ChordEstimate> {
        segments
            .iter()
            .map(|seg| {
                let (chord, frequency) = CHORD_TABLE[seg.index % CHORD_TABLE.len()];
                ChordEstimate {
                    index: seg.index,
                    chord: chord.to_string(),
                    frequency,
                }
            })
            .collect()
    }
}

/// Run the analyzer on a background thread; the result arrives on `tx`
/// after [`ANALYSIS_DELAY`]. The receiver decides whether `generation` is
/// still current.
pub fn spawn_analysis(segments: Arc<[Segment]>, generation: u64, tx: Sender<AnalysisResult>) {
    thread::spawn(move || {
        thread::sleep(ANALYSIS_DELAY);
        let estimates = SimulatedAnalyzer.analyze(&segments);
        log::debug!("analysis done: {} estimates (generation {generation})", estimates.len());
        // The app may have shut down; a dead receiver is fine.
        let _ = tx.send(AnalysisResult { generation, estimates });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use basscore::{build_segments, SEGMENT_LEN};

    #[test]
    fn test_estimates_cover_every_bar() {
        let segments = build_segments(40.0, SEGMENT_LEN); // 10 bars
        let estimates = SimulatedAnalyzer.analyze(&segments);
        assert_eq!(estimates.len(), 10);
        for (i, est) in estimates.iter().enumerate() {
            assert_eq!(est.index, i);
        }
        assert_eq!(estimates[0].chord, "C");
        assert_eq!(estimates[5].chord, "G");
        assert_eq!(estimates[6].frequency, 110.0);
    }
}
