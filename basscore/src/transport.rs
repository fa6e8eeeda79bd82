//! Interfaces to the external audio engine.
//!
//! The core never decodes or plays audio itself. It drives an
//! [`AudioEngine`] for transport control and polls its [`Transport`] for
//! the live position; everything else (decoding, mixing, the DSP chain the
//! pass-through parameters are forwarded to) lives behind these traits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Duration assumed when a track fails to decode. Segmentation still
/// proceeds against this placeholder so the bar grid stays usable; the
/// resulting [`TrackInfo`] is marked as a fallback.
pub const FALLBACK_DURATION: f64 = 180.0;

/// Name shown when nothing is loaded or the file has no usable title.
pub const NO_TRACK_NAME: &str = "no track";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not decode {}", .0.display())]
    Undecodable(PathBuf),
}

/// Opaque engine-side identifier. The core stores and forwards it to the
/// external DSP chain without ever looking inside.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EngineHandle(pub u64);

/// Metadata for the loaded track. `identity: None` is the valid
/// "no track loaded" state.
#[derive(Clone, Debug)]
pub struct TrackInfo {
    pub identity: Option<PathBuf>,
    pub display_name: String,
    /// Track length in seconds; `0.0` when unknown or nothing is loaded.
    pub duration: f64,
    /// True when `duration` is the decode-failure placeholder rather than
    /// a value read from the file.
    pub decode_fallback: bool,
}

impl Default for TrackInfo {
    fn default() -> Self {
        Self {
            identity: None,
            display_name: NO_TRACK_NAME.to_string(),
            duration: 0.0,
            decode_fallback: false,
        }
    }
}

impl TrackInfo {
    pub fn is_loaded(&self) -> bool {
        self.identity.is_some() && self.duration > 0.0
    }

    /// Placeholder info for a track that would not decode.
    pub fn fallback(identity: &Path) -> Self {
        Self {
            display_name: display_name_from_path(identity),
            identity: Some(identity.to_path_buf()),
            duration: FALLBACK_DURATION,
            decode_fallback: true,
        }
    }
}

/// File-stem display name for tracks without usable metadata.
pub fn display_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| NO_TRACK_NAME.to_string())
}

/// Live position source. Polled from the playback clock's sampler thread,
/// so implementations must be shareable across threads.
pub trait Transport: Send + Sync {
    /// Current playback position in seconds.
    fn current_position(&self) -> f64;
}

/// The external decoding/playback engine the core drives.
pub trait AudioEngine {
    /// Decode `identity` far enough to learn its duration and display
    /// name. Playback does not start until [`AudioEngine::start`].
    fn load_track(&mut self, identity: &Path) -> Result<TrackInfo, DecodeError>;

    fn start(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);

    /// Position source for the clock's sampler.
    fn transport(&self) -> Arc<dyn Transport>;

    /// Opaque handle forwarded to the external DSP chain.
    fn handle(&self) -> EngineHandle {
        EngineHandle::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_track_info_is_unloaded() {
        let info = TrackInfo::default();
        assert!(!info.is_loaded());
        assert_eq!(info.display_name, "no track");
        assert_eq!(info.duration, 0.0);
    }

    #[test]
    fn test_fallback_is_marked_and_segmentable() {
        let info = TrackInfo::fallback(Path::new("/music/broken.mp3"));
        assert!(info.decode_fallback);
        assert!(info.is_loaded());
        assert_eq!(info.duration, FALLBACK_DURATION);
        assert_eq!(info.display_name, "broken");
    }
}
