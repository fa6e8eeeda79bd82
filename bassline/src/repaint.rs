//! Repaint governor.
//!
//! egui only repaints on input unless asked otherwise. While the transport
//! is rolling the playhead moves between inputs, so the app requests a
//! timed repaint matched to the clock's 100 ms sampling cadence — painting
//! faster would only redraw identical positions. One-shot repaints cover
//! state that changes off the input path (a background analysis landing).

use std::time::Duration;

/// Repaint cadence while playback or analysis is running. Matches the
/// position sampler, which publishes at the same interval.
const ACTIVE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
pub struct RepaintGovernor {
    active: bool,
    dirty: bool,
}

impl RepaintGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep timed repaints running (playback rolling, analysis pending).
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Request a single repaint for a state change outside user input.
    pub fn poke(&mut self) {
        self.dirty = true;
    }

    /// Call at the end of `update()` to schedule the next frame.
    pub fn schedule(&mut self, ctx: &egui::Context) {
        if self.active {
            ctx.request_repaint_after(ACTIVE_INTERVAL);
        } else if self.dirty {
            ctx.request_repaint();
        }
        // otherwise egui sleeps until the next input event
        self.dirty = false;
    }
}
