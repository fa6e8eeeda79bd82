//! Playback clock — transport state machine plus a background sampler.
//!
//! While playing, a sampler thread polls the external [`Transport`] every
//! 100 ms and publishes the latest sample into an atomic slot. The clock
//! never extrapolates between samples: `position()` is always exactly the
//! last value the sampler observed, clamped to `[0, duration]` and
//! monotone for the lifetime of one play run.
//!
//! The sampler is a single thread per play run that re-checks its stop
//! flag once per cadence interval, so it can never overlap itself and
//! halts within one interval of the state leaving Playing. Cancellation
//! never joins the thread — `pause()`/`stop()` must not block their
//! caller — instead the clock swaps in a fresh atomic slot and lets the
//! old thread wind down writing into an orphan nothing reads anymore.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::transport::Transport;

/// Cadence of the position sampler.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("no track loaded")]
    NoTrackLoaded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

/// Slot the sampler publishes into. Position travels as `f64` bits in an
/// `AtomicU64` so readers on other threads never see a torn value.
struct SampleSlot {
    position_bits: AtomicU64,
    reached_end: AtomicBool,
}

impl SampleSlot {
    fn at(position: f64) -> Self {
        Self {
            position_bits: AtomicU64::new(position.to_bits()),
            reached_end: AtomicBool::new(false),
        }
    }

    fn position(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Acquire))
    }

    fn store_position(&self, position: f64) {
        self.position_bits.store(position.to_bits(), Ordering::Release);
    }
}

/// Cancellation handle for one sampler thread.
struct Sampler {
    stop: Arc<AtomicBool>,
}

impl Sampler {
    fn cancel(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct PlaybackClock {
    state: TransportState,
    duration: f64,
    slot: Arc<SampleSlot>,
    sampler: Option<Sampler>,
    interval: Duration,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::with_interval(SAMPLE_INTERVAL)
    }

    /// Clock with a custom sampling cadence. Tests use a short one.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            state: TransportState::Stopped,
            duration: 0.0,
            slot: Arc::new(SampleSlot::at(0.0)),
            sampler: None,
            interval,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Latest sampled position in seconds.
    pub fn position(&self) -> f64 {
        self.slot.position()
    }

    /// Bind the clock to a freshly loaded track: cancels any sampler from
    /// the previous track and resets to Stopped at position 0.
    pub fn reset(&mut self, duration: f64) {
        self.detach_sampler();
        self.replace_slot(0.0);
        self.state = TransportState::Stopped;
        self.duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
    }

    /// Begin or resume playback, polling `transport` for position.
    /// Fails while no track is bound (`duration == 0`).
    pub fn start(&mut self, transport: &Arc<dyn Transport>) -> Result<(), ClockError> {
        if self.duration <= 0.0 {
            return Err(ClockError::NoTrackLoaded);
        }
        match self.state {
            TransportState::Playing => {}
            TransportState::Stopped => {
                self.replace_slot(0.0);
                self.state = TransportState::Playing;
                self.spawn_sampler(transport);
                log::debug!("playback: playing ({:.1}s track)", self.duration);
            }
            TransportState::Paused => {
                self.state = TransportState::Playing;
                self.spawn_sampler(transport);
                log::debug!("playback: resumed at {:.1}s", self.position());
            }
        }
        Ok(())
    }

    /// Halt sampling but keep the position for a later resume.
    pub fn pause(&mut self) {
        if self.state != TransportState::Playing {
            return;
        }
        self.detach_sampler();
        let held = self.slot.position();
        self.replace_slot(held);
        self.state = TransportState::Paused;
        log::debug!("playback: paused at {held:.1}s");
    }

    /// Halt sampling and rewind to position 0.
    pub fn stop(&mut self) {
        self.detach_sampler();
        self.replace_slot(0.0);
        self.state = TransportState::Stopped;
        log::debug!("playback: stopped");
    }

    /// Fold the sampler's latest observation into the state machine; call
    /// once per frame. Returns true when this call detected the end of the
    /// track — the state drops to Stopped and the position holds at the
    /// track duration until an explicit [`stop`](Self::stop).
    pub fn tick(&mut self) -> bool {
        if self.state == TransportState::Playing && self.slot.reached_end.load(Ordering::Acquire) {
            self.detach_sampler();
            self.state = TransportState::Stopped;
            log::debug!("playback: reached end of track");
            return true;
        }
        false
    }

    fn detach_sampler(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.cancel();
        }
    }

    /// Swap in a fresh slot seeded at `position`. A cancelled sampler that
    /// has not yet noticed its stop flag keeps writing into the old slot,
    /// which no reader holds anymore.
    fn replace_slot(&mut self, position: f64) {
        self.slot = Arc::new(SampleSlot::at(position));
    }

    fn spawn_sampler(&mut self, transport: &Arc<dyn Transport>) {
        let stop = Arc::new(AtomicBool::new(false));
        let slot = Arc::clone(&self.slot);
        let transport = Arc::clone(transport);
        let duration = self.duration;
        let interval = self.interval;
        let thread_stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !thread_stop.load(Ordering::Acquire) {
                let sample = transport.current_position();
                if sample.is_finite() {
                    let sample = sample.clamp(0.0, duration);
                    // One live sampler per slot, so read-compare-store holds
                    // the monotonicity invariant without a lock.
                    if sample > slot.position() {
                        slot.store_position(sample);
                    }
                    if sample >= duration {
                        slot.reached_end.store(true, Ordering::Release);
                        break;
                    }
                }
                thread::sleep(interval);
            }
        });
        self.sampler = Some(Sampler { stop });
    }
}

impl Drop for PlaybackClock {
    fn drop(&mut self) {
        self.detach_sampler();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scriptable position source for driving the sampler from tests.
    struct FakeTransport(AtomicU64);

    impl FakeTransport {
        fn at(position: f64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(position.to_bits())))
        }

        fn set(&self, position: f64) {
            self.0.store(position.to_bits(), Ordering::Release);
        }
    }

    impl Transport for FakeTransport {
        fn current_position(&self) -> f64 {
            f64::from_bits(self.0.load(Ordering::Acquire))
        }
    }

    fn fast_clock(duration: f64) -> PlaybackClock {
        let mut clock = PlaybackClock::with_interval(Duration::from_millis(1));
        clock.reset(duration);
        clock
    }

    /// Give the 1ms sampler ample time to observe the fake transport.
    fn settle() {
        thread::sleep(Duration::from_millis(40));
    }

    #[test]
    fn test_start_without_track_is_rejected() {
        let mut clock = PlaybackClock::new();
        let fake = FakeTransport::at(0.0);
        let transport: Arc<dyn Transport> = fake;
        assert_eq!(clock.start(&transport), Err(ClockError::NoTrackLoaded));
        assert_eq!(clock.state(), TransportState::Stopped);
        assert_eq!(clock.position(), 0.0);
    }

    #[test]
    fn test_sampler_publishes_latest_position() {
        let mut clock = fast_clock(40.0);
        let fake = FakeTransport::at(0.0);
        let transport: Arc<dyn Transport> = fake.clone();
        clock.start(&transport).unwrap();

        fake.set(5.0);
        settle();
        assert_eq!(clock.position(), 5.0);
        assert_eq!(clock.state(), TransportState::Playing);
        assert!(!clock.tick());
    }

    #[test]
    fn test_position_is_monotone_while_playing() {
        let mut clock = fast_clock(40.0);
        let fake = FakeTransport::at(0.0);
        let transport: Arc<dyn Transport> = fake.clone();
        clock.start(&transport).unwrap();

        fake.set(8.0);
        settle();
        fake.set(3.0); // transport glitch: reports a step backwards
        settle();
        assert_eq!(clock.position(), 8.0);
    }

    #[test]
    fn test_end_of_track_forces_stop_and_stop_rewinds() {
        let mut clock = fast_clock(40.0);
        let fake = FakeTransport::at(0.0);
        let transport: Arc<dyn Transport> = fake.clone();
        clock.start(&transport).unwrap();

        fake.set(41.0); // past the end; published position clamps to 40
        settle();
        assert!(clock.tick());
        assert_eq!(clock.state(), TransportState::Stopped);
        assert_eq!(clock.position(), 40.0);

        clock.stop();
        assert_eq!(clock.position(), 0.0);
    }

    #[test]
    fn test_pause_preserves_position_and_resume_continues() {
        let mut clock = fast_clock(40.0);
        let fake = FakeTransport::at(0.0);
        let transport: Arc<dyn Transport> = fake.clone();
        clock.start(&transport).unwrap();

        fake.set(5.0);
        settle();
        clock.pause();
        assert_eq!(clock.state(), TransportState::Paused);
        assert_eq!(clock.position(), 5.0);

        // A cancelled sampler must not keep publishing.
        fake.set(20.0);
        settle();
        assert_eq!(clock.position(), 5.0);

        clock.start(&transport).unwrap();
        settle();
        assert_eq!(clock.state(), TransportState::Playing);
        assert_eq!(clock.position(), 20.0);
    }

    #[test]
    fn test_reset_rebinds_and_discards_old_sampler() {
        let mut clock = fast_clock(40.0);
        let fake = FakeTransport::at(10.0);
        let transport: Arc<dyn Transport> = fake.clone();
        clock.start(&transport).unwrap();
        settle();
        assert_eq!(clock.position(), 10.0);

        clock.reset(20.0);
        assert_eq!(clock.state(), TransportState::Stopped);
        assert_eq!(clock.position(), 0.0);
        assert_eq!(clock.duration(), 20.0);

        // Writes from the superseded run never surface.
        fake.set(15.0);
        settle();
        assert_eq!(clock.position(), 0.0);
    }

    #[test]
    fn test_restart_after_end_begins_at_zero() {
        let mut clock = fast_clock(8.0);
        let fake = FakeTransport::at(9.0);
        let transport: Arc<dyn Transport> = fake.clone();
        clock.start(&transport).unwrap();
        settle();
        assert!(clock.tick());

        fake.set(0.0);
        clock.start(&transport).unwrap();
        assert_eq!(clock.state(), TransportState::Playing);
        settle();
        assert!(clock.position() < 8.0);
    }
}
