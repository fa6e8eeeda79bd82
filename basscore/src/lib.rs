//! basscore — bar segmentation, annotation, and playback-sync engine.
//!
//! A loaded track is cut into fixed-length bars, each carrying a chord
//! label, a root frequency, and an enabled flag. A playback clock samples
//! an external transport and maps the live position back onto the bar
//! sequence. Audio decoding, playback, and all DSP stay behind the traits
//! in [`transport`]; this crate owns only the data and timing contracts.

pub mod annotations;
pub mod clock;
pub mod segment;
pub mod session;
pub mod transport;
pub mod zoom;

pub use annotations::{Analyzer, AnnotationError, AnnotationStore, Applied, ChordEstimate};
pub use clock::{ClockError, PlaybackClock, TransportState, SAMPLE_INTERVAL};
pub use segment::{build_segments, Segment, SEGMENT_LEN};
pub use session::{ApplyOutcome, DspParams, Session};
pub use transport::{AudioEngine, DecodeError, EngineHandle, TrackInfo, Transport};
