//! # Symphonia Decoder Adapter
//!
//! Implements the decoder adapter contracts on top of Symphonia: the format
//! reader becomes an [`AccessUnitReader`] (one packet per access unit) and the
//! codec becomes a [`PcmDecoder`] that decodes each fed packet synchronously
//! and queues the result.

use crate::config::DecodeConfig;
use crate::decoder::format_detector::FormatDetector;
use crate::decoder::sample_converter::SampleConverter;
use crate::error::{Result, WaveformError};
use crate::traits::{
    AccessUnit, AccessUnitReader, AudioFormatInfo, AudioSource, DecoderBackend, DecoderInput,
    DecoderOutput, OpenedStream, OutputLayout, PcmChunk, PcmDecoder,
};
use bytes::Bytes;
use core_runtime::logging::strip_path;
use std::collections::VecDeque;
use std::io::Cursor;
use std::time::Duration;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, error, info, instrument, warn};

/// Consecutive undecodable packets tolerated before the decoder gives up.
const MAX_CONSECUTIVE_ERRORS: usize = 10;

/// Channel count assumed when the container does not declare one. The first
/// decoded packet corrects it through a layout change.
const FALLBACK_CHANNELS: u16 = 2;

// ============================================================================
// Backend
// ============================================================================

/// [`DecoderBackend`] backed by Symphonia's default probe and codec registry.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaBackend {
    config: DecodeConfig,
}

impl SymphoniaBackend {
    pub fn new(config: DecodeConfig) -> Self {
        Self { config }
    }

    fn open_media_source(source: &AudioSource) -> Result<(MediaSourceStream, Hint, u64)> {
        match source {
            AudioSource::LocalFile { path } => {
                let shown = path.display().to_string();
                let file = std::fs::File::open(path).map_err(|e| {
                    error!("Failed to open file {}: {}", strip_path(&shown), e);
                    WaveformError::SourceUnreadable(format!("Failed to open file: {}", e))
                })?;
                let total_bytes = file
                    .metadata()
                    .map_err(|e| {
                        WaveformError::SourceUnreadable(format!("Failed to stat file: {}", e))
                    })?
                    .len();

                let hint = FormatDetector::hint_from_path(path);
                let media_source = Box::new(file) as Box<dyn MediaSource>;
                Ok((
                    MediaSourceStream::new(media_source, Default::default()),
                    hint,
                    total_bytes,
                ))
            }
            AudioSource::InMemory {
                data,
                extension_hint,
            } => {
                let hint = extension_hint
                    .as_deref()
                    .map(FormatDetector::hint_from_extension)
                    .unwrap_or_else(Hint::new);
                let total_bytes = data.len() as u64;
                let media_source = Box::new(Cursor::new(data.clone())) as Box<dyn MediaSource>;
                Ok((
                    MediaSourceStream::new(media_source, Default::default()),
                    hint,
                    total_bytes,
                ))
            }
        }
    }
}

impl DecoderBackend for SymphoniaBackend {
    #[instrument(skip(self, source))]
    fn open(&self, source: &AudioSource) -> Result<OpenedStream> {
        let (media_source, hint, total_bytes) = Self::open_media_source(source)?;

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                media_source,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                error!("Format probe failed: {}", e);
                WaveformError::SourceUnreadable(format!("Failed to probe format: {}", e))
            })?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                error!("No audio tracks found");
                WaveformError::NoAudioTrack("no track with a known codec".to_string())
            })?;

        let track_id = track.id;
        let params = track.codec_params.clone();
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| WaveformError::UnsupportedCodec("missing sample rate".to_string()))?;
        let channels = params
            .channels
            .map(|ch| ch.count() as u16)
            .unwrap_or(FALLBACK_CHANNELS);
        let duration_us = params
            .n_frames
            .map(|frames| (frames as f64 * 1_000_000.0 / sample_rate as f64) as u64)
            .unwrap_or(0);
        let codec = FormatDetector::codec_mime(params.codec);

        info!(
            track_id,
            codec,
            sample_rate,
            channels,
            duration_us,
            total_bytes,
            "Opened audio track"
        );

        let format = AudioFormatInfo::new(channels, sample_rate, duration_us, codec);
        let reader = SymphoniaReader {
            format_reader,
            track_id,
            time_base: params.time_base,
            format,
            total_bytes,
        };
        let decoder = SymphoniaPcmDecoder::new(params, track_id, self.config.max_pending_chunks);

        Ok(OpenedStream {
            reader: Box::new(reader),
            decoder: Box::new(decoder),
        })
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Demuxer half: yields the selected track's packets as access units.
pub struct SymphoniaReader {
    format_reader: Box<dyn FormatReader>,
    track_id: u32,
    time_base: Option<TimeBase>,
    format: AudioFormatInfo,
    total_bytes: u64,
}

impl SymphoniaReader {
    fn timestamp_us(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(time_base) => {
                let time = time_base.calc_time(ts);
                time.seconds * 1_000_000 + (time.frac * 1_000_000.0) as u64
            }
            None => 0,
        }
    }
}

impl AccessUnitReader for SymphoniaReader {
    fn format(&self) -> &AudioFormatInfo {
        &self.format
    }

    fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    fn next_access_unit(&mut self) -> Result<Option<AccessUnit>> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Reached end of compressed stream");
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Track list changed, treating as end of stream");
                    return Ok(None);
                }
                Err(e) => {
                    error!("Failed to read packet: {}", e);
                    return Err(WaveformError::DecoderError(format!(
                        "Failed to read packet: {}",
                        e
                    )));
                }
            };

            while !self.format_reader.metadata().is_latest() {
                self.format_reader.metadata().pop();
            }

            if packet.track_id() != self.track_id {
                continue;
            }

            let presentation_time_us = self.timestamp_us(packet.ts());
            return Ok(Some(AccessUnit::new(
                Bytes::from(packet.data),
                presentation_time_us,
            )));
        }
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Codec half: decodes fed packets and queues interleaved i16 PCM.
pub struct SymphoniaPcmDecoder {
    params: CodecParameters,
    track_id: u32,
    decoder: Option<Box<dyn Decoder>>,
    pending: VecDeque<DecoderOutput>,
    max_pending: usize,
    layout: Option<OutputLayout>,
    input_ended: bool,
    consecutive_errors: usize,
    skipped_packets: u64,
}

impl SymphoniaPcmDecoder {
    pub fn new(params: CodecParameters, track_id: u32, max_pending: usize) -> Self {
        Self {
            params,
            track_id,
            decoder: None,
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            layout: None,
            input_ended: false,
            consecutive_errors: 0,
            skipped_packets: 0,
        }
    }

    /// Packets dropped because they failed to decode.
    pub fn skipped_packets(&self) -> u64 {
        self.skipped_packets
    }

    fn decode_unit(&mut self, unit: AccessUnit) -> Result<()> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| WaveformError::DecoderError("decoder not started".to_string()))?;

        let ts = self
            .params
            .time_base
            .map(|tb| {
                let micros = unit.presentation_time_us;
                tb.calc_timestamp(Time::new(micros / 1_000_000, (micros % 1_000_000) as f64 / 1e6))
            })
            .unwrap_or(0);
        let packet = Packet::new_from_slice(self.track_id, ts, 0, &unit.data);

        // Convert inside the match so the decoder borrow ends here.
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                Ok((spec, SampleConverter::to_interleaved_i16_le(decoded)))
            }
            Err(e) => Err(e),
        };

        match decoded {
            Ok((spec, data)) => {
                self.consecutive_errors = 0;

                let layout = OutputLayout {
                    channels: spec.channels.count() as u16,
                    sample_rate: spec.rate,
                };
                if self.layout != Some(layout) {
                    debug!(
                        "Output layout now {} channels at {} Hz",
                        layout.channels, layout.sample_rate
                    );
                    self.layout = Some(layout);
                    self.pending.push_back(DecoderOutput::LayoutChanged(layout));
                }

                if !data.is_empty() {
                    self.pending
                        .push_back(DecoderOutput::Chunk(PcmChunk::new(data)));
                }
                Ok(())
            }
            Err(SymphoniaError::DecodeError(err)) => self.skip_packet(err),
            Err(SymphoniaError::IoError(err)) => self.skip_packet(&err.to_string()),
            Err(SymphoniaError::ResetRequired) => {
                warn!("Decoder reset required");
                if let Some(decoder) = self.decoder.as_mut() {
                    decoder.reset();
                }
                Ok(())
            }
            Err(e) => {
                error!("Fatal decode error: {}", e);
                Err(WaveformError::DecoderError(format!(
                    "Failed to decode packet: {}",
                    e
                )))
            }
        }
    }

    fn skip_packet(&mut self, reason: &str) -> Result<()> {
        self.consecutive_errors += 1;
        self.skipped_packets += 1;
        warn!(
            "Skipping undecodable packet (attempt {}/{}): {}",
            self.consecutive_errors, MAX_CONSECUTIVE_ERRORS, reason
        );

        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            error!("Too many consecutive decode errors, stream may be corrupted");
            return Err(WaveformError::DecoderError(format!(
                "Decoder failure after {} failed packets",
                MAX_CONSECUTIVE_ERRORS
            )));
        }
        Ok(())
    }
}

impl PcmDecoder for SymphoniaPcmDecoder {
    fn start(&mut self, format: &AudioFormatInfo) -> Result<()> {
        let decoder = symphonia::default::get_codecs()
            .make(&self.params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create decoder: {}", e);
                WaveformError::UnsupportedCodec(format!("{}: {}", format.codec, e))
            })?;

        self.layout = Some(OutputLayout {
            channels: format.channels,
            sample_rate: format.sample_rate,
        });
        self.decoder = Some(decoder);
        debug!("Decoder started for {}", format.codec);
        Ok(())
    }

    fn dequeue_input(&mut self, _timeout: Duration) -> Result<bool> {
        if self.decoder.is_none() {
            return Err(WaveformError::DecoderError("decoder not started".to_string()));
        }
        Ok(!self.input_ended && self.pending.len() < self.max_pending)
    }

    fn feed(&mut self, input: DecoderInput) -> Result<()> {
        match input {
            DecoderInput::Data(unit) => self.decode_unit(unit),
            DecoderInput::EndOfStream => {
                self.input_ended = true;
                self.pending.push_back(DecoderOutput::EndOfStream);
                Ok(())
            }
        }
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<DecoderOutput> {
        Ok(self
            .pending
            .pop_front()
            .unwrap_or(DecoderOutput::NothingReady))
    }

    fn release(&mut self) {
        if self.decoder.take().is_some() {
            debug!(
                skipped_packets = self.skipped_packets,
                "Released Symphonia decoder"
            );
        }
        self.pending.clear();
    }
}
