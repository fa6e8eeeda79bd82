//! Rodio-backed audio engine.
//!
//! Implements the `AudioEngine` side of the core: decoding, transport
//! control, a position source for the playback clock's sampler, and the
//! sine sub-bass voice. rodio's own decoder covers mp3/wav/flac/ogg; m4a
//! and aac go through a direct symphonia decode instead.

use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use basscore::transport::{display_name_from_path, FALLBACK_DURATION};
use basscore::{AudioEngine, DecodeError, TrackInfo, Transport};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Elapsed-time position accounting, shared with the sampler thread.
/// rodio has no position query, so the engine keeps its own books: time
/// since the last (re)start plus everything accumulated before pauses.
pub struct EnginePosition {
    inner: Mutex<PositionInner>,
}

struct PositionInner {
    play_start: Option<Instant>,
    accumulated: Duration,
}

impl EnginePosition {
    fn new() -> Self {
        Self {
            inner: Mutex::new(PositionInner { play_start: None, accumulated: Duration::ZERO }),
        }
    }

    fn restart(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.play_start = Some(Instant::now());
            inner.accumulated = Duration::ZERO;
        }
    }

    fn resume(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.play_start.is_none() {
                inner.play_start = Some(Instant::now());
            }
        }
    }

    fn pause(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(start) = inner.play_start.take() {
                inner.accumulated += start.elapsed();
            }
        }
    }

    fn reset(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.play_start = None;
            inner.accumulated = Duration::ZERO;
        }
    }
}

impl Transport for EnginePosition {
    fn current_position(&self) -> f64 {
        let Ok(inner) = self.inner.lock() else { return 0.0 };
        let running = inner.play_start.map(|s| s.elapsed()).unwrap_or_default();
        (inner.accumulated + running).as_secs_f64()
    }
}

/// Fully decoded PCM for formats rodio's decoder rejects.
struct PcmTrack {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl PcmTrack {
    fn duration(&self) -> f64 {
        let frames = self.samples.len() as f64 / self.channels.max(1) as f64;
        frames / self.sample_rate.max(1) as f64
    }
}

enum LoadedAudio {
    /// Raw file bytes; rodio re-decodes them on every start.
    Encoded(Arc<Vec<u8>>),
    /// Pre-decoded samples (the symphonia fallback path).
    Pcm(Arc<PcmTrack>),
}

/// A rodio source over a shared [`PcmTrack`].
struct PcmSource {
    track: Arc<PcmTrack>,
    pos: usize,
}

impl Iterator for PcmSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = self.track.samples.get(self.pos).copied();
        if sample.is_some() {
            self.pos += 1;
        }
        sample
    }
}

impl Source for PcmSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.track.samples.len() - self.pos)
    }

    fn channels(&self) -> u16 {
        self.track.channels
    }

    fn sample_rate(&self) -> u32 {
        self.track.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(self.track.duration()))
    }
}

/// Sine sub-bass voice: short attack/release envelope to avoid clicks,
/// soft clip to protect speakers.
struct SubVoice {
    freq: f32,
    sample_rate: u32,
    num_samples: usize,
    current: usize,
}

const SUB_ENVELOPE_SAMPLES: usize = 500;

impl SubVoice {
    fn new(freq: f32, length: Duration) -> Self {
        let sample_rate = 44100;
        Self {
            freq,
            sample_rate,
            num_samples: (sample_rate as f64 * length.as_secs_f64()) as usize,
            current: 0,
        }
    }
}

impl Iterator for SubVoice {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.current >= self.num_samples {
            return None;
        }
        let t = self.current as f32 / self.sample_rate as f32;
        self.current += 1;

        let envelope = if self.current < SUB_ENVELOPE_SAMPLES {
            self.current as f32 / SUB_ENVELOPE_SAMPLES as f32
        } else if self.current > self.num_samples.saturating_sub(SUB_ENVELOPE_SAMPLES) {
            (self.num_samples - self.current) as f32 / SUB_ENVELOPE_SAMPLES as f32
        } else {
            1.0
        };

        let sample = (t * self.freq * std::f32::consts::TAU).sin() * 0.3 * envelope;
        Some(sample.tanh())
    }
}

impl Source for SubVoice {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_millis(
            (self.num_samples as u64 * 1000) / self.sample_rate as u64,
        ))
    }
}

pub struct RodioEngine {
    _stream: Option<OutputStream>,
    handle: Option<OutputStreamHandle>,
    sink: Option<Sink>,
    sub_sink: Option<Sink>,
    audio: Option<LoadedAudio>,
    position: Arc<EnginePosition>,
    volume: f32,
}

impl Default for RodioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RodioEngine {
    pub fn new() -> Self {
        let (stream, handle) = OutputStream::try_default().ok().unzip();
        if handle.is_none() {
            log::warn!("no audio output device; playback disabled");
        }
        Self {
            _stream: stream,
            handle,
            sink: None,
            sub_sink: None,
            audio: None,
            position: Arc::new(EnginePosition::new()),
            volume: 0.8,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(ref sink) = self.sink {
            sink.set_volume(self.volume);
        }
    }

    /// Start (or replace) the sub-bass voice. `frequency` arrives already
    /// octave-shifted; `gain` is the sub-bass volume slider.
    pub fn trigger_sub(&mut self, frequency: f64, seconds: f64, gain: f32) {
        self.silence_sub();
        if frequency <= 0.0 || seconds <= 0.0 || gain <= 0.0 {
            return;
        }
        let Some(ref handle) = self.handle else { return };
        if let Ok(sink) = Sink::try_new(handle) {
            sink.set_volume(gain);
            sink.append(SubVoice::new(frequency as f32, Duration::from_secs_f64(seconds)));
            self.sub_sink = Some(sink);
        }
    }

    pub fn silence_sub(&mut self) {
        if let Some(sink) = self.sub_sink.take() {
            sink.stop();
        }
    }
}

impl AudioEngine for RodioEngine {
    fn load_track(&mut self, identity: &Path) -> Result<TrackInfo, DecodeError> {
        self.stop();
        self.audio = None;

        let data = std::fs::read(identity)?;
        let ext = identity
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        // Container header usually knows the duration up front.
        let probed_duration = probe_duration(&data, &ext);

        // rodio's decoder panics on some malformed headers, hence the catch.
        let rodio_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            Decoder::new(Cursor::new(data.clone()))
        }));

        let (audio, decoded_duration) = match rodio_result {
            Ok(Ok(decoder)) => {
                let d = decoder.total_duration().map(|d| d.as_secs_f64());
                (LoadedAudio::Encoded(Arc::new(data)), d)
            }
            _ => {
                let pcm = decode_with_symphonia(data, &ext)
                    .ok_or_else(|| DecodeError::Undecodable(identity.to_path_buf()))?;
                let d = Some(pcm.duration());
                (LoadedAudio::Pcm(Arc::new(pcm)), d)
            }
        };

        let (duration, decode_fallback) = match probed_duration.or(decoded_duration) {
            Some(d) if d > 0.0 => (d, false),
            _ => {
                log::warn!("{}: no duration in header or stream, assuming {FALLBACK_DURATION}s", identity.display());
                (FALLBACK_DURATION, true)
            }
        };

        self.audio = Some(audio);
        self.position.reset();

        Ok(TrackInfo {
            display_name: title_from_tags(identity),
            identity: Some(identity.to_path_buf()),
            duration,
            decode_fallback,
        })
    }

    fn start(&mut self) {
        if let Some(ref sink) = self.sink {
            if sink.is_paused() {
                sink.play();
                self.position.resume();
                return;
            }
            if !sink.empty() {
                return; // already playing
            }
        }
        let Some(ref handle) = self.handle else { return };
        let Some(ref audio) = self.audio else { return };

        let sink = match Sink::try_new(handle) {
            Ok(sink) => sink,
            Err(err) => {
                log::warn!("audio output failed: {err}");
                return;
            }
        };
        sink.set_volume(self.volume);
        match audio {
            LoadedAudio::Encoded(data) => match Decoder::new(Cursor::new(data.as_ref().clone())) {
                Ok(source) => sink.append(source.convert_samples::<f32>()),
                Err(err) => {
                    log::warn!("decode failed at playback: {err}");
                    return;
                }
            },
            LoadedAudio::Pcm(track) => sink.append(PcmSource { track: Arc::clone(track), pos: 0 }),
        }
        self.sink = Some(sink);
        self.position.restart();
    }

    fn pause(&mut self) {
        if let Some(ref sink) = self.sink {
            sink.pause();
        }
        self.position.pause();
        self.silence_sub();
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.silence_sub();
        self.position.reset();
    }

    fn transport(&self) -> Arc<dyn Transport> {
        self.position.clone()
    }
}

/// Read the duration from the container header without decoding.
fn probe_duration(data: &[u8], ext: &str) -> Option<f64> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());
    let mut hint = Hint::new();
    if !ext.is_empty() {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .ok()?;
    let track = probed.format.default_track()?;
    let sample_rate = track.codec_params.sample_rate? as f64;
    let frames = track.codec_params.n_frames? as f64;
    Some(frames / sample_rate)
}

/// Decode the whole stream with symphonia (for m4a/aac that rodio's
/// decoder can't handle).
fn decode_with_symphonia(data: Vec<u8>, ext: &str) -> Option<PcmTrack> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());
    let mut hint = Hint::new();
    if !ext.is_empty() {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .ok()?;
    let mut format = probed.format;
    let track = format.default_track()?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track.codec_params.channels.map(|c| c.count() as u16).unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .ok()?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }
                match decoder.decode(&packet) {
                    Ok(decoded) => {
                        let spec = *decoded.spec();
                        let capacity = decoded.capacity() as u64;
                        let mut buf = SampleBuffer::<f32>::new(capacity, spec);
                        buf.copy_interleaved_ref(decoded);
                        samples.extend_from_slice(buf.samples());
                    }
                    Err(_) => continue,
                }
            }
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(_) => break,
        }
    }

    if samples.is_empty() {
        return None;
    }
    Some(PcmTrack { samples, sample_rate, channels })
}

/// Track title from ID3 tags when present, else the file stem.
fn title_from_tags(path: &Path) -> String {
    id3::Tag::read_from_path(path)
        .ok()
        .and_then(|tag| {
            use id3::TagLike;
            tag.title().map(|t| t.to_string())
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| display_name_from_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_accounting_across_pause() {
        let pos = EnginePosition::new();
        assert_eq!(pos.current_position(), 0.0);

        pos.restart();
        std::thread::sleep(Duration::from_millis(30));
        assert!(pos.current_position() >= 0.02);

        pos.pause();
        let held = pos.current_position();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(pos.current_position(), held);

        pos.resume();
        std::thread::sleep(Duration::from_millis(30));
        assert!(pos.current_position() > held);

        pos.reset();
        assert_eq!(pos.current_position(), 0.0);
    }

    #[test]
    fn test_sub_voice_stays_in_safe_range() {
        let voice = SubVoice::new(65.4, Duration::from_millis(200));
        let samples: Vec<f32> = voice.collect();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.abs() <= 0.31));
        // Envelope: starts and ends near silence.
        assert!(samples[0].abs() < 0.01);
        assert!(samples[samples.len() - 1].abs() < 0.01);
    }

    #[test]
    fn test_sub_voice_length_matches_duration() {
        let voice = SubVoice::new(98.0, Duration::from_millis(500));
        assert_eq!(voice.num_samples, 22050);
        assert_eq!(voice.total_duration(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_pcm_track_duration() {
        let track = PcmTrack {
            samples: vec![0.0; 88200],
            sample_rate: 44100,
            channels: 2,
        };
        assert_eq!(track.duration(), 1.0);
    }
}
