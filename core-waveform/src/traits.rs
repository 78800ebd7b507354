//! # Decoder Adapter Contracts
//!
//! This module defines the seam between the waveform core and whatever codec
//! actually turns compressed audio into PCM. The core never decodes audio
//! itself: it drives an adapter that looks like a hardware-style codec with
//! input and output slots.
//!
//! ## Architecture
//!
//! ```text
//! AudioSource ──open──▶ DecoderBackend ──▶ (AccessUnitReader, PcmDecoder)
//!
//! AccessUnitReader ──AccessUnit──▶ PcmDecoder ──PcmChunk──▶ PcmAssembler
//! ```
//!
//! - **AccessUnitReader**: the demuxer side. Reports the stream format and
//!   hands out one compressed access unit at a time.
//! - **PcmDecoder**: the codec side. Accepts access units (or an end-of-stream
//!   marker) when an input slot is free and yields interleaved 16-bit
//!   little-endian PCM chunks when output is ready.
//!
//! ## Threading Model
//!
//! Both halves are exclusively owned by one in-flight assembly and must be
//! `Send` so the assembly can run on a blocking worker thread.

use crate::error::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Format Types
// ============================================================================

/// MIME-like identifier of the AAC variant whose header-only first access
/// unit must not reach the decoder.
pub const AAC_LATM_MIME: &str = "audio/mp4a-latm";

/// Stream format reported by the demuxer. Produced once per decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormatInfo {
    /// Number of interleaved channels (1 = mono, 2 = stereo, ...)
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Total stream duration in microseconds (0 when unknown)
    pub duration_us: u64,
    /// MIME-like codec identifier (e.g. `audio/mpeg`)
    pub codec: String,
}

impl AudioFormatInfo {
    /// Create a new format descriptor.
    pub fn new(channels: u16, sample_rate: u32, duration_us: u64, codec: impl Into<String>) -> Self {
        Self {
            channels,
            sample_rate,
            duration_us,
            codec: codec.into(),
        }
    }

    /// Expected number of samples per channel, rounded to nearest.
    ///
    /// Returns `None` when the duration is unknown, since a zero estimate
    /// would end decoding before the first chunk.
    pub fn expected_samples(&self) -> Option<u64> {
        if self.duration_us == 0 {
            return None;
        }
        let samples = self.duration_us as f64 / 1_000_000.0 * self.sample_rate as f64 + 0.5;
        Some(samples as u64)
    }

    /// Size of one interleaved frame in bytes.
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * 2
    }

    /// Stream duration as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.duration_us)
    }

    /// Returns `true` if the codec identifier names an audio stream.
    pub fn is_audio(&self) -> bool {
        self.codec.starts_with("audio/")
    }
}

// ============================================================================
// Audio Source Types
// ============================================================================

/// Source of compressed audio.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Audio file stored locally on the filesystem.
    LocalFile {
        /// Path to the audio file
        path: PathBuf,
    },

    /// Encoded audio already held in memory (e.g. a bundled asset).
    InMemory {
        /// Raw encoded bytes (container format, not PCM)
        data: Bytes,
        /// Optional file extension hint for container probing (e.g. `"mp3"`)
        extension_hint: Option<String>,
    },
}

impl AudioSource {
    /// Convenience constructor for a local file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        AudioSource::LocalFile { path: path.into() }
    }

    /// Convenience constructor for an in-memory asset.
    pub fn in_memory(data: impl Into<Bytes>, extension_hint: Option<&str>) -> Self {
        AudioSource::InMemory {
            data: data.into(),
            extension_hint: extension_hint.map(str::to_string),
        }
    }

    /// Returns the source size in bytes when it is known without I/O.
    pub fn known_size(&self) -> Option<u64> {
        match self {
            AudioSource::InMemory { data, .. } => Some(data.len() as u64),
            AudioSource::LocalFile { .. } => None,
        }
    }
}

// ============================================================================
// Codec Exchange Types
// ============================================================================

/// One compressed chunk produced by the demuxer, consumed whole by the decoder.
#[derive(Debug, Clone)]
pub struct AccessUnit {
    /// Compressed payload
    pub data: Bytes,
    /// Presentation timestamp in microseconds
    pub presentation_time_us: u64,
}

impl AccessUnit {
    pub fn new(data: impl Into<Bytes>, presentation_time_us: u64) -> Self {
        Self {
            data: data.into(),
            presentation_time_us,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Input submitted to a decoder's free input slot.
#[derive(Debug, Clone)]
pub enum DecoderInput {
    /// A compressed access unit
    Data(AccessUnit),
    /// No further compressed input will arrive
    EndOfStream,
}

/// A chunk of decoded interleaved i16 little-endian PCM.
#[derive(Debug, Clone, Default)]
pub struct PcmChunk {
    /// Interleaved little-endian 16-bit samples
    pub data: Bytes,
    /// Set on the final chunk when the decoder flags end-of-stream with data
    pub end_of_stream: bool,
}

impl PcmChunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            end_of_stream: false,
        }
    }

    /// Mark this chunk as the last one of the stream.
    pub fn with_end_of_stream(mut self) -> Self {
        self.end_of_stream = true;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Layout of the decoder's output after a format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    pub channels: u16,
    pub sample_rate: u32,
}

/// Result of polling the decoder's output side.
#[derive(Debug, Clone)]
pub enum DecoderOutput {
    /// Decoded PCM is available
    Chunk(PcmChunk),
    /// Subsequent output conforms to a new layout
    LayoutChanged(OutputLayout),
    /// Nothing ready within the poll timeout
    NothingReady,
    /// The decoder has flushed everything it will ever produce
    EndOfStream,
}

// ============================================================================
// Core Traits
// ============================================================================

/// Demuxer side of a decoder adapter.
pub trait AccessUnitReader: Send {
    /// Format of the selected audio track.
    fn format(&self) -> &AudioFormatInfo;

    /// Total size of the compressed source in bytes.
    fn total_bytes(&self) -> u64;

    /// Read the next access unit. `Ok(None)` means the source is exhausted.
    fn next_access_unit(&mut self) -> Result<Option<AccessUnit>>;
}

/// Codec side of a decoder adapter.
///
/// Modeled as a stateful codec with bounded slots: callers poll for a free
/// input slot and for ready output instead of blocking indefinitely, so the
/// driving loop stays responsive to its own termination conditions.
pub trait PcmDecoder: Send {
    /// Configure and start the codec for the given stream format.
    fn start(&mut self, format: &AudioFormatInfo) -> Result<()>;

    /// Wait up to `timeout` for a free input slot.
    fn dequeue_input(&mut self, timeout: Duration) -> Result<bool>;

    /// Submit input into the slot obtained from [`PcmDecoder::dequeue_input`].
    fn feed(&mut self, input: DecoderInput) -> Result<()>;

    /// Wait up to `timeout` for decoded output.
    fn dequeue_output(&mut self, timeout: Duration) -> Result<DecoderOutput>;

    /// Stop the codec and release its resources. Must be idempotent.
    fn release(&mut self);
}

/// Both halves of an opened stream.
pub struct OpenedStream {
    pub reader: Box<dyn AccessUnitReader>,
    pub decoder: Box<dyn PcmDecoder>,
}

/// Factory that opens an [`AudioSource`] into a reader/decoder pair.
///
/// # Errors
///
/// - `SourceUnreadable` if the source cannot be opened
/// - `NoAudioTrack` if no stream identifies as audio
pub trait DecoderBackend: Send + Sync {
    fn open(&self, source: &AudioSource) -> Result<OpenedStream>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_samples_rounds_to_nearest() {
        let format = AudioFormatInfo::new(1, 44_100, 2_000_000, "audio/raw");
        assert_eq!(format.expected_samples(), Some(88_200));

        // 1 µs at 44.1 kHz = 0.0441 samples -> 0
        let tiny = AudioFormatInfo::new(1, 44_100, 1, "audio/raw");
        assert_eq!(tiny.expected_samples(), Some(0));

        // 0.5 sample rounds up
        let half = AudioFormatInfo::new(1, 1_000_000, 1, "audio/raw");
        assert_eq!(half.expected_samples(), Some(1));
    }

    #[test]
    fn unknown_duration_has_no_expectation() {
        let format = AudioFormatInfo::new(2, 48_000, 0, "audio/mpeg");
        assert_eq!(format.expected_samples(), None);
    }

    #[test]
    fn frame_bytes_follow_channel_count() {
        assert_eq!(AudioFormatInfo::new(1, 8_000, 0, "audio/raw").frame_bytes(), 2);
        assert_eq!(AudioFormatInfo::new(6, 8_000, 0, "audio/raw").frame_bytes(), 12);
    }

    #[test]
    fn audio_classification() {
        assert!(AudioFormatInfo::new(2, 44_100, 0, "audio/flac").is_audio());
        assert!(!AudioFormatInfo::new(0, 0, 0, "video/avc").is_audio());
    }

    #[test]
    fn audio_source_sizes() {
        let local = AudioSource::file("/music/track.mp3");
        assert_eq!(local.known_size(), None);

        let memory = AudioSource::in_memory(vec![1u8, 2, 3, 4], Some("wav"));
        assert_eq!(memory.known_size(), Some(4));
    }

    #[test]
    fn pcm_chunk_flags() {
        let chunk = PcmChunk::new(vec![0u8; 4]);
        assert!(!chunk.end_of_stream);
        assert_eq!(chunk.len(), 4);

        let last = chunk.with_end_of_stream();
        assert!(last.end_of_stream);
        assert!(PcmChunk::default().is_empty());
    }
}
