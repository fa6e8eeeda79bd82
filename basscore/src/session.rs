//! Track session — owns everything that lives and dies with one loaded
//! track: metadata, the annotated bar sequence, the playback clock, the
//! zoom level, and the pass-through DSP parameters.
//!
//! All mutation goes through `&mut Session`, which serializes writers at
//! the type level. The only concurrent actors are the clock's sampler
//! (writes one atomic slot the clock owns) and analyzer threads, whose
//! results come back tagged with the session generation and are dropped
//! when a reload has made them stale.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::annotations::{AnnotationError, AnnotationStore, Applied, ChordEstimate};
use crate::clock::{ClockError, PlaybackClock, TransportState};
use crate::segment::{build_segments, Segment, SEGMENT_LEN};
use crate::transport::{AudioEngine, EngineHandle, TrackInfo};
use crate::zoom;

/// Default number of bars shown when no preference is stored.
pub const DEFAULT_ZOOM: i32 = 16;

/// Pass-through parameters for the external DSP chain. The core stores
/// and clamps them; it never interprets them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DspParams {
    /// Sub-bass octave transposition: 0, -1, or -2.
    pub octave_shift: i8,
    /// Sub-bass layer volume, 0..=1.
    pub sub_volume: f32,
    pub eq_bass: f32,
    pub eq_mid: f32,
    pub eq_treble: f32,
}

impl Default for DspParams {
    fn default() -> Self {
        Self {
            octave_shift: 0,
            sub_volume: 0.5,
            eq_bass: 0.5,
            eq_mid: 0.5,
            eq_treble: 0.5,
        }
    }
}

impl DspParams {
    pub fn set_octave_shift(&mut self, shift: i8) {
        self.octave_shift = shift.clamp(-2, 0);
    }

    pub fn set_sub_volume(&mut self, volume: f32) {
        self.sub_volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_eq(&mut self, bass: f32, mid: f32, treble: f32) {
        self.eq_bass = bass.clamp(0.0, 1.0);
        self.eq_mid = mid.clamp(0.0, 1.0);
        self.eq_treble = treble.clamp(0.0, 1.0);
    }

    /// Clamp every field into its documented range. Used after
    /// deserializing stored preferences.
    pub fn sanitized(mut self) -> Self {
        self.set_octave_shift(self.octave_shift);
        self.set_sub_volume(self.sub_volume);
        self.set_eq(self.eq_bass, self.eq_mid, self.eq_treble);
        self
    }
}

/// What became of one analyzer delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(Applied),
    /// The results were produced against a superseded session and were
    /// discarded whole.
    Stale,
}

pub struct Session {
    track: TrackInfo,
    handle: EngineHandle,
    store: AnnotationStore,
    clock: PlaybackClock,
    zoom_level: i32,
    dsp: DspParams,
    generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            track: TrackInfo::default(),
            handle: EngineHandle::default(),
            store: AnnotationStore::empty(),
            clock: PlaybackClock::new(),
            zoom_level: DEFAULT_ZOOM,
            dsp: DspParams::default(),
            generation: 0,
        }
    }

    /// Load (or reload) a track through the external engine. The previous
    /// bar sequence, clock state, and any in-flight analysis are all
    /// superseded wholesale. A decode failure falls back to a placeholder
    /// track so segmentation still proceeds.
    pub fn load_track(&mut self, engine: &mut dyn AudioEngine, identity: &Path) -> &TrackInfo {
        engine.stop();
        self.generation += 1;
        let track = match engine.load_track(identity) {
            Ok(info) => {
                log::info!("loaded {} ({:.1}s)", info.display_name, info.duration);
                info
            }
            Err(err) => {
                log::warn!("decode failed for {}: {err}; using placeholder duration", identity.display());
                TrackInfo::fallback(identity)
            }
        };
        self.store = AnnotationStore::seed(build_segments(track.duration, SEGMENT_LEN));
        self.clock.reset(track.duration);
        self.handle = engine.handle();
        self.track = track;
        &self.track
    }

    pub fn track(&self) -> &TrackInfo {
        &self.track
    }

    /// Generation to tag background work with; bumped on every reload.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Handle forwarded untouched to the external DSP chain.
    pub fn engine_handle(&self) -> EngineHandle {
        self.handle
    }

    pub fn segments(&self) -> &[Segment] {
        self.store.segments()
    }

    pub fn snapshot(&self) -> Arc<[Segment]> {
        self.store.snapshot()
    }

    /// The zoom-limited prefix of the bar sequence.
    pub fn visible_segments(&self) -> &[Segment] {
        zoom::visible(self.store.segments(), self.zoom_level)
    }

    pub fn zoom_level(&self) -> i32 {
        self.zoom_level
    }

    pub fn set_zoom_level(&mut self, level: i32) {
        self.zoom_level = zoom::clamp_level(level);
    }

    pub fn dsp(&self) -> DspParams {
        self.dsp
    }

    pub fn dsp_mut(&mut self) -> &mut DspParams {
        &mut self.dsp
    }

    pub fn toggle_enabled(&mut self, index: usize) -> Result<Arc<[Segment]>, AnnotationError> {
        self.store.toggle_enabled(index)
    }

    /// Merge analyzer output produced against `generation`. Deliveries
    /// from a superseded session are discarded, not applied.
    pub fn apply_analysis(&mut self, generation: u64, estimates: &[ChordEstimate]) -> ApplyOutcome {
        if generation != self.generation {
            log::debug!(
                "discarding stale analysis (generation {generation}, current {})",
                self.generation
            );
            return ApplyOutcome::Stale;
        }
        let (_, counts) = self.store.apply_analysis(estimates);
        if counts.out_of_range > 0 {
            log::debug!("analysis: {} estimates targeted missing bars", counts.out_of_range);
        }
        ApplyOutcome::Applied(counts)
    }

    // Transport facade: keeps the engine and the clock in lockstep.

    pub fn start(&mut self, engine: &mut dyn AudioEngine) -> Result<(), ClockError> {
        self.clock.start(&engine.transport())?;
        engine.start();
        Ok(())
    }

    pub fn pause(&mut self, engine: &mut dyn AudioEngine) {
        engine.pause();
        self.clock.pause();
    }

    pub fn stop(&mut self, engine: &mut dyn AudioEngine) {
        engine.stop();
        self.clock.stop();
    }

    /// Advance the state machine one frame. When the sampler has seen the
    /// end of the track the engine is told to stop too.
    pub fn tick(&mut self, engine: &mut dyn AudioEngine) -> TransportState {
        if self.clock.tick() {
            engine.stop();
        }
        self.clock.state()
    }

    pub fn playback_state(&self) -> TransportState {
        self.clock.state()
    }

    pub fn position(&self) -> f64 {
        self.clock.position()
    }

    /// Index of the bar under the playhead, clamped to the last bar when
    /// the position sits at the end of the track. `None` without bars.
    pub fn active_segment_index(&self) -> Option<usize> {
        let count = self.store.len();
        if count == 0 {
            return None;
        }
        let raw = (self.clock.position() / SEGMENT_LEN).floor() as usize;
        Some(raw.min(count - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{DecodeError, Transport, FALLBACK_DURATION};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Engine stub: fixed duration per load, scriptable position.
    struct FakeEngine {
        duration: Option<f64>,
        position: Arc<FakePosition>,
        started: u32,
        stopped: u32,
    }

    struct FakePosition(AtomicU64);

    impl Transport for FakePosition {
        fn current_position(&self) -> f64 {
            f64::from_bits(self.0.load(Ordering::Acquire))
        }
    }

    impl FakeEngine {
        fn with_duration(duration: f64) -> Self {
            Self {
                duration: Some(duration),
                position: Arc::new(FakePosition(AtomicU64::new(0f64.to_bits()))),
                started: 0,
                stopped: 0,
            }
        }

        fn failing() -> Self {
            Self { duration: None, ..Self::with_duration(0.0) }
        }

        fn seek(&self, position: f64) {
            self.position.0.store(position.to_bits(), Ordering::Release);
        }
    }

    impl AudioEngine for FakeEngine {
        fn load_track(&mut self, identity: &Path) -> Result<TrackInfo, DecodeError> {
            match self.duration {
                Some(duration) => Ok(TrackInfo {
                    display_name: "fake".into(),
                    identity: Some(identity.to_path_buf()),
                    duration,
                    decode_fallback: false,
                }),
                None => Err(DecodeError::Undecodable(identity.to_path_buf())),
            }
        }

        fn start(&mut self) {
            self.started += 1;
        }

        fn pause(&mut self) {}

        fn stop(&mut self) {
            self.stopped += 1;
        }

        fn transport(&self) -> Arc<dyn Transport> {
            self.position.clone()
        }
    }

    fn fast_session() -> Session {
        let mut session = Session::new();
        session.clock = PlaybackClock::with_interval(Duration::from_millis(1));
        session
    }

    #[test]
    fn test_load_seeds_bars_and_active_index_follows_position() {
        let mut session = fast_session();
        let mut engine = FakeEngine::with_duration(16.0);
        session.load_track(&mut engine, Path::new("/music/track.mp3"));

        let segs = session.snapshot();
        assert_eq!(segs.len(), 4);
        assert_eq!(segs[0].start_time, 0.0);
        assert_eq!(segs[3].end_time, 16.0);
        let enabled: Vec<bool> = segs.iter().map(|s| s.enabled).collect();
        assert_eq!(enabled, vec![false, true, true, false]);

        session.start(&mut engine).unwrap();
        assert_eq!(engine.started, 1);
        engine.seek(5.0);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(session.position(), 5.0);
        assert_eq!(session.active_segment_index(), Some(1));
    }

    #[test]
    fn test_start_without_track_is_rejected() {
        let mut session = fast_session();
        let mut engine = FakeEngine::with_duration(16.0);
        assert_eq!(session.start(&mut engine), Err(ClockError::NoTrackLoaded));
        assert_eq!(session.playback_state(), TransportState::Stopped);
        assert_eq!(engine.started, 0);
    }

    #[test]
    fn test_decode_failure_falls_back_to_placeholder() {
        let mut session = fast_session();
        let mut engine = FakeEngine::failing();
        let info = session.load_track(&mut engine, Path::new("/music/broken.mp3"));
        assert!(info.decode_fallback);
        assert_eq!(info.duration, FALLBACK_DURATION);
        assert_eq!(session.segments().len(), 45);
    }

    #[test]
    fn test_active_index_clamps_at_end_of_track() {
        let mut session = fast_session();
        let mut engine = FakeEngine::with_duration(16.0);
        session.load_track(&mut engine, Path::new("/music/track.mp3"));
        session.start(&mut engine).unwrap();
        engine.seek(16.0);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(session.tick(&mut engine), TransportState::Stopped);
        assert_eq!(session.position(), 16.0);
        assert_eq!(session.active_segment_index(), Some(3));
        // End-of-track also halts the engine.
        assert!(engine.stopped >= 1);
    }

    #[test]
    fn test_toggle_and_analysis_both_land() {
        let mut session = fast_session();
        let mut engine = FakeEngine::with_duration(16.0);
        session.load_track(&mut engine, Path::new("/music/track.mp3"));
        let generation = session.generation();

        session.toggle_enabled(1).unwrap();
        let outcome = session.apply_analysis(
            generation,
            &[ChordEstimate { index: 1, chord: "G7".into(), frequency: 98.0 }],
        );
        assert_eq!(outcome, ApplyOutcome::Applied(Applied { applied: 1, out_of_range: 0 }));

        let segs = session.snapshot();
        assert!(!segs[1].enabled); // the toggle survived the merge
        assert_eq!(segs[1].chord, "G7");
        assert_eq!(segs[1].frequency, 98.0);
    }

    #[test]
    fn test_reload_discards_stale_analysis() {
        let mut session = fast_session();
        let mut engine = FakeEngine::with_duration(16.0);
        session.load_track(&mut engine, Path::new("/music/a.mp3"));
        let old_generation = session.generation();
        session.load_track(&mut engine, Path::new("/music/b.mp3"));

        let outcome = session.apply_analysis(
            old_generation,
            &[ChordEstimate { index: 0, chord: "B".into(), frequency: 61.7 }],
        );
        assert_eq!(outcome, ApplyOutcome::Stale);
        assert_eq!(session.segments()[0].chord, "C"); // seed untouched
    }

    #[test]
    fn test_reload_resets_clock() {
        let mut session = fast_session();
        let mut engine = FakeEngine::with_duration(16.0);
        session.load_track(&mut engine, Path::new("/music/a.mp3"));
        session.start(&mut engine).unwrap();
        engine.seek(10.0);
        std::thread::sleep(Duration::from_millis(40));

        session.load_track(&mut engine, Path::new("/music/b.mp3"));
        assert_eq!(session.playback_state(), TransportState::Stopped);
        assert_eq!(session.position(), 0.0);
        assert!(engine.stopped >= 1);
    }

    #[test]
    fn test_zoom_level_coerces() {
        let mut session = fast_session();
        session.set_zoom_level(2);
        assert_eq!(session.zoom_level(), 4);
        session.set_zoom_level(99);
        assert_eq!(session.zoom_level(), 32);
    }

    #[test]
    fn test_visible_window_tracks_zoom() {
        let mut session = fast_session();
        let mut engine = FakeEngine::with_duration(180.0); // 45 bars
        session.load_track(&mut engine, Path::new("/music/long.mp3"));
        session.set_zoom_level(8);
        assert_eq!(session.visible_segments().len(), 8);
        session.set_zoom_level(32);
        assert_eq!(session.visible_segments().len(), 32);
    }

    #[test]
    fn test_dsp_params_clamp() {
        let mut params = DspParams::default();
        params.set_octave_shift(-5);
        assert_eq!(params.octave_shift, -2);
        params.set_octave_shift(3);
        assert_eq!(params.octave_shift, 0);
        params.set_sub_volume(1.7);
        assert_eq!(params.sub_volume, 1.0);
        params.set_eq(-1.0, 0.4, 2.0);
        assert_eq!((params.eq_bass, params.eq_mid, params.eq_treble), (0.0, 0.4, 1.0));
    }
}
