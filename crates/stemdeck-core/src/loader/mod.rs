//! Stem asset loading and decoding
//!
//! Loads every stem of a session in one concurrent batch: one decode task
//! per stem, all results joined before playback starts. Failures are
//! isolated per stem - a stem that cannot be fetched or decoded is logged
//! and left out of the cache, and the rest of the batch proceeds.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::types::{StemId, StereoSample};

/// Errors that can occur while fetching/decoding one stem
///
/// A load error is terminal for that one stem only: the stem stays
/// unplayable for the session and every other stem is unaffected.
#[derive(Error, Debug)]
pub enum LoadError {
    /// File not found or couldn't be read
    #[error("failed to open stem asset: {0}")]
    Io(#[from] std::io::Error),

    /// Container/codec not recognized by the decoder
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// No decodable audio track in the container
    #[error("no audio track found")]
    NoAudioTrack,

    /// Decoder failed partway through the stream
    #[error("decode failed: {0}")]
    Decode(String),

    /// Decoded stream is at a different rate than the output stream
    ///
    /// Stems are rejected rather than resampled; tempo/pitch machinery is
    /// out of scope for this player.
    #[error("sample rate mismatch: stream is {expected}Hz, stem is {found}Hz")]
    SampleRateMismatch { expected: u32, found: u32 },

    /// Decoder produced zero frames
    #[error("stem decoded to an empty stream")]
    EmptyStream,
}

/// Immutable decoded audio for one stem
///
/// Created once by [`load_all`], shared read-only via `Arc` thereafter.
/// Never mutated; dropped only at session teardown.
#[derive(Debug, Clone)]
pub struct DecodedBuffer {
    samples: Vec<StereoSample>,
    sample_rate: u32,
}

impl DecodedBuffer {
    /// Build a buffer directly from samples (used by tests and tools)
    pub fn from_samples(samples: Vec<StereoSample>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Number of stereo frames in the buffer
    #[inline]
    pub fn len_frames(&self) -> usize {
        self.samples.len()
    }

    /// Sample rate the stream was decoded at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Read one frame by index (caller guarantees `idx < len_frames`)
    #[inline]
    pub fn frame(&self, idx: usize) -> StereoSample {
        self.samples[idx]
    }

    /// All frames
    pub fn samples(&self) -> &[StereoSample] {
        &self.samples
    }
}

/// Shared read-only cache of decoded stems, keyed by [`StemId`]
///
/// Populated once by [`load_all`] and treated as read-only thereafter.
/// Stems that failed to load keep their error around for diagnostics.
#[derive(Debug, Default)]
pub struct BufferCache {
    buffers: HashMap<StemId, Arc<DecodedBuffer>>,
    failures: HashMap<StemId, LoadError>,
}

impl BufferCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a decoded stem
    pub fn get(&self, id: &StemId) -> Option<&Arc<DecodedBuffer>> {
        self.buffers.get(id)
    }

    /// Why a stem is missing, if its load failed
    pub fn failure(&self, id: &StemId) -> Option<&LoadError> {
        self.failures.get(id)
    }

    /// Number of resident (successfully decoded) stems
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// True when no stem decoded successfully
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Insert a decoded stem (used by tests and tools)
    pub fn insert(&mut self, id: StemId, buffer: DecodedBuffer) {
        self.buffers.insert(id, Arc::new(buffer));
    }

    /// Resident stem ids in a deterministic order
    pub fn resident_ids(&self) -> Vec<StemId> {
        let mut ids: Vec<StemId> = self.buffers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Consume the cache, yielding resident stems in a deterministic order
    pub fn into_resident(self) -> Vec<(StemId, Arc<DecodedBuffer>)> {
        let mut entries: Vec<_> = self.buffers.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// Fetch and decode every stem in the list, joining all results
///
/// Decodes run in parallel, one task per stem; the call returns only once
/// every task has finished, successes and failures both collected. The
/// call never fails as a whole - each failure is logged and recorded in
/// the cache for later diagnostics.
///
/// `expected_rate` is the output stream's sample rate; stems decoded at a
/// different rate are rejected (see [`LoadError::SampleRateMismatch`]).
pub fn load_all(ids: &[StemId], expected_rate: u32) -> BufferCache {
    let results: Vec<(StemId, Result<DecodedBuffer, LoadError>)> = ids
        .par_iter()
        .map(|id| (id.clone(), decode_stem(Path::new(id.as_str()), expected_rate)))
        .collect();

    let mut cache = BufferCache::new();
    for (id, result) in results {
        match result {
            Ok(buffer) => {
                log::info!(
                    "loaded stem {} ({:.2}s @ {}Hz)",
                    id,
                    buffer.duration_seconds(),
                    buffer.sample_rate()
                );
                cache.buffers.insert(id, Arc::new(buffer));
            }
            Err(e) => {
                log::warn!("failed to load stem {}: {}", id, e);
                cache.failures.insert(id, e);
            }
        }
    }
    cache
}

/// Decode one audio file into a stereo buffer
///
/// Mono sources are up-mixed to both channels; sources with more than two
/// channels keep their first stereo pair.
fn decode_stem(path: &Path, expected_rate: u32) -> Result<DecodedBuffer, LoadError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Hint the probe with the file extension
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| LoadError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(LoadError::NoAudioTrack)?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| LoadError::UnsupportedFormat("unknown sample rate".to_string()))?;

    if sample_rate != expected_rate {
        return Err(LoadError::SampleRateMismatch {
            expected: expected_rate,
            found: sample_rate,
        });
    }

    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| LoadError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<StereoSample> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(LoadError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                // A corrupt packet mid-stream is recoverable; skip it
                log::warn!("skipping undecodable packet in {:?}: {}", path, e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(duration, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            let interleaved = buf.samples();
            match channels {
                0 | 1 => {
                    samples.extend(interleaved.iter().map(|&s| StereoSample::mono(s)));
                }
                n => {
                    samples.extend(
                        interleaved
                            .chunks_exact(n)
                            .map(|frame| StereoSample::new(frame[0], frame[1])),
                    );
                }
            }
        }
    }

    if samples.is_empty() {
        return Err(LoadError::EmptyStream);
    }

    Ok(DecodedBuffer { samples, sample_rate })
}
