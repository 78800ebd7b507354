//! # Streaming PCM Assembler
//!
//! Drives a [`PcmDecoder`] to completion and collects everything it produces
//! into one contiguous [`PcmBuffer`].
//!
//! ## Loop
//!
//! Each iteration performs one feed step and one drain step:
//!
//! 1. **Feed**: when the decoder has a free input slot, hand it the next
//!    access unit, or an end-of-stream marker once the reader is exhausted.
//! 2. **Drain**: copy one ready output chunk into the buffer, growing it first
//!    when the chunk does not fit.
//! 3. **Stop** on decoder end-of-stream or once the per-channel sample count
//!    reaches the count implied by the stream duration. Some decoders never
//!    signal end-of-stream, so the second check is what ends those streams.
//!
//! Allocation exhaustion and mid-stream decoder failures end the loop early
//! with whatever was decoded; the reason is reported as an [`AssemblyOutcome`].
//! The decoder is released on every exit path, including errors and
//! cancellation.

use crate::config::DecodeConfig;
use crate::error::{Result, WaveformError};
use crate::pcm_buffer::{extrapolated_capacity, BufferAllocator, PcmBuffer, SystemAllocator};
use crate::traits::{
    AccessUnit, AccessUnitReader, AudioFormatInfo, DecoderInput, DecoderOutput, PcmDecoder,
    AAC_LATM_MIME,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Why the assembly loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// The decoder signalled end-of-stream
    EndOfStream,
    /// The expected sample count was reached before end-of-stream
    ExpectedSamplesReached,
    /// The buffer could not grow; the result is truncated
    AllocationExhausted,
    /// The decoder or reader failed mid-stream; the result is truncated
    DecoderFailed,
    /// Input ended but the decoder never signalled end-of-stream
    MissingEndOfStream,
}

impl AssemblyOutcome {
    /// Returns `true` if decoding stopped before the stream was exhausted.
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            AssemblyOutcome::AllocationExhausted | AssemblyOutcome::DecoderFailed
        )
    }
}

/// Counters collected during one assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    /// Access units submitted to the decoder
    pub access_units_fed: u64,
    /// Access units dropped before reaching the decoder
    pub access_units_skipped: u64,
    /// Compressed bytes consumed from the reader (skipped units included)
    pub bytes_read: u64,
    /// Output chunks copied into the buffer
    pub chunks_drained: u64,
    /// Successful buffer resizes
    pub growth_events: u32,
    /// Final buffer capacity in bytes
    pub final_capacity: usize,
    /// Wall time spent in the loop
    pub elapsed: Duration,
}

/// Everything the assembler produced for one stream.
#[derive(Debug)]
pub struct AssembledPcm {
    /// Stream format, with the channel layout the decoder actually emitted
    pub format: AudioFormatInfo,
    /// Interleaved samples (whole frames only)
    pub pcm: Vec<i16>,
    /// Frames per channel
    pub samples_decoded: u64,
    /// Size of the compressed source in bytes
    pub source_bytes: u64,
    pub outcome: AssemblyOutcome,
    pub stats: AssemblyStats,
}

/// Releases the decoder when dropped.
struct ReleaseGuard<'a> {
    decoder: &'a mut dyn PcmDecoder,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.decoder.release();
    }
}

/// Assembles decoded PCM from a reader/decoder pair.
pub struct PcmAssembler {
    config: DecodeConfig,
    allocator: Arc<dyn BufferAllocator>,
}

impl PcmAssembler {
    /// Assembler using the system allocator.
    pub fn new(config: DecodeConfig) -> Self {
        Self::with_allocator(config, Arc::new(SystemAllocator))
    }

    /// Assembler using a custom buffer allocator.
    pub fn with_allocator(config: DecodeConfig, allocator: Arc<dyn BufferAllocator>) -> Self {
        Self { config, allocator }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decode the whole stream into PCM.
    ///
    /// `cancel` is checked once per loop iteration.
    ///
    /// # Errors
    ///
    /// - Errors from [`PcmDecoder::start`] (e.g. `UnsupportedCodec`)
    /// - `Cancelled` if the token fires before the loop finishes
    #[instrument(skip_all, fields(codec = %reader.format().codec))]
    pub fn assemble(
        &self,
        reader: &mut dyn AccessUnitReader,
        decoder: &mut dyn PcmDecoder,
        cancel: &CancellationToken,
    ) -> Result<AssembledPcm> {
        let started = Instant::now();
        let mut format = reader.format().clone();
        let source_bytes = reader.total_bytes();
        let expected = format.expected_samples();

        info!(
            channels = format.channels,
            sample_rate = format.sample_rate,
            duration_us = format.duration_us,
            source_bytes,
            "Assembling PCM"
        );

        let mut guard = ReleaseGuard { decoder };
        guard.decoder.start(&format)?;

        let mut buffer = match PcmBuffer::allocate(
            self.config.initial_capacity_bytes,
            self.allocator.as_ref(),
            self.config.allocation_retries,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Initial PCM allocation failed: {}", e);
                let stats = AssemblyStats {
                    elapsed: started.elapsed(),
                    ..Default::default()
                };
                return Ok(finish(
                    format,
                    PcmBuffer::empty(),
                    source_bytes,
                    AssemblyOutcome::AllocationExhausted,
                    stats,
                ));
            }
        };

        let timeout = self.config.dequeue_timeout;
        let mut stats = AssemblyStats::default();
        let mut input_done = false;
        let mut first_unit = true;
        let mut reader_failed = false;
        let mut idle_polls: u32 = 0;

        let outcome = loop {
            if cancel.is_cancelled() {
                info!("Assembly cancelled");
                return Err(WaveformError::Cancelled);
            }

            // Feed
            if !input_done {
                let slot = match guard.decoder.dequeue_input(timeout) {
                    Ok(slot) => slot,
                    Err(e) => {
                        warn!("Decoder input failed: {}", e);
                        break AssemblyOutcome::DecoderFailed;
                    }
                };

                if slot {
                    let input = match next_input(reader, &format, &mut first_unit, &mut stats) {
                        Ok(Some(unit)) => DecoderInput::Data(unit),
                        Ok(None) => {
                            input_done = true;
                            DecoderInput::EndOfStream
                        }
                        Err(e) => {
                            warn!("Reader failed, flushing decoder: {}", e);
                            input_done = true;
                            reader_failed = true;
                            DecoderInput::EndOfStream
                        }
                    };

                    let is_data = matches!(input, DecoderInput::Data(_));
                    if let Err(e) = guard.decoder.feed(input) {
                        warn!("Decoder rejected input: {}", e);
                        break AssemblyOutcome::DecoderFailed;
                    }
                    if is_data {
                        stats.access_units_fed += 1;
                    } else {
                        debug!("Submitted end-of-stream after {} units", stats.access_units_fed);
                    }
                }
            }

            // Drain
            match guard.decoder.dequeue_output(timeout) {
                Ok(DecoderOutput::Chunk(chunk)) => {
                    idle_polls = 0;

                    if chunk.len() > buffer.remaining() {
                        let new_capacity = extrapolated_capacity(
                            buffer.position(),
                            chunk.len(),
                            source_bytes,
                            stats.bytes_read,
                            self.config.growth_headroom,
                            self.config.growth_margin_bytes,
                        );
                        if let Err(e) = buffer.grow_to(
                            new_capacity,
                            self.allocator.as_ref(),
                            self.config.allocation_retries,
                        ) {
                            warn!(
                                "Stopping with partial PCM at {} bytes: {}",
                                buffer.position(),
                                e
                            );
                            break AssemblyOutcome::AllocationExhausted;
                        }
                    }

                    buffer.write(&chunk.data);
                    stats.chunks_drained += 1;

                    if chunk.end_of_stream {
                        break AssemblyOutcome::EndOfStream;
                    }
                    if let Some(expected) = expected {
                        if buffer.frames(format.channels) >= expected {
                            debug!(expected, "Reached expected sample count");
                            break AssemblyOutcome::ExpectedSamplesReached;
                        }
                    }
                }
                Ok(DecoderOutput::LayoutChanged(layout)) => {
                    debug!(
                        channels = layout.channels,
                        sample_rate = layout.sample_rate,
                        "Decoder output layout changed"
                    );
                    format.channels = layout.channels;
                    format.sample_rate = layout.sample_rate;
                }
                Ok(DecoderOutput::NothingReady) => {
                    if input_done {
                        idle_polls += 1;
                        if idle_polls >= self.config.eos_grace_polls {
                            warn!(
                                "Decoder never signalled end-of-stream after {} idle polls",
                                idle_polls
                            );
                            break AssemblyOutcome::MissingEndOfStream;
                        }
                    }
                }
                Ok(DecoderOutput::EndOfStream) => break AssemblyOutcome::EndOfStream,
                Err(e) => {
                    warn!("Decoder output failed: {}", e);
                    break AssemblyOutcome::DecoderFailed;
                }
            }
        };

        drop(guard);

        // Reader failure truncates input even when the decoder flushed cleanly.
        let outcome = if reader_failed && outcome == AssemblyOutcome::EndOfStream {
            AssemblyOutcome::DecoderFailed
        } else {
            outcome
        };

        stats.growth_events = buffer.growth_events();
        stats.final_capacity = buffer.capacity();
        stats.elapsed = started.elapsed();

        let assembled = finish(format, buffer, source_bytes, outcome, stats);
        info!(
            samples_decoded = assembled.samples_decoded,
            outcome = ?assembled.outcome,
            growth_events = assembled.stats.growth_events,
            "PCM assembly finished"
        );
        Ok(assembled)
    }
}

/// Pull the next unit worth feeding, dropping the header-only first unit of
/// LATM AAC streams.
fn next_input(
    reader: &mut dyn AccessUnitReader,
    format: &AudioFormatInfo,
    first_unit: &mut bool,
    stats: &mut AssemblyStats,
) -> Result<Option<AccessUnit>> {
    loop {
        let Some(unit) = reader.next_access_unit()? else {
            return Ok(None);
        };
        stats.bytes_read += unit.len() as u64;

        let is_first = std::mem::replace(first_unit, false);
        if is_first && unit.len() == 2 && format.codec == AAC_LATM_MIME {
            debug!("Skipping 2-byte leading AAC access unit");
            stats.access_units_skipped += 1;
            continue;
        }
        return Ok(Some(unit));
    }
}

fn finish(
    format: AudioFormatInfo,
    buffer: PcmBuffer,
    source_bytes: u64,
    outcome: AssemblyOutcome,
    stats: AssemblyStats,
) -> AssembledPcm {
    let samples_decoded = buffer.frames(format.channels);
    let mut pcm = buffer.into_samples();
    pcm.truncate(samples_decoded as usize * format.channels as usize);

    AssembledPcm {
        format,
        pcm,
        samples_decoded,
        source_bytes,
        outcome,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{OutputLayout, PcmChunk};
    use std::collections::VecDeque;

    struct VecReader {
        format: AudioFormatInfo,
        units: VecDeque<AccessUnit>,
        fail_at_end: bool,
    }

    impl VecReader {
        fn new(format: AudioFormatInfo, units: Vec<Vec<u8>>) -> Self {
            Self {
                format,
                units: units
                    .into_iter()
                    .enumerate()
                    .map(|(i, u)| AccessUnit::new(u, i as u64))
                    .collect(),
                fail_at_end: false,
            }
        }
    }

    impl AccessUnitReader for VecReader {
        fn format(&self) -> &AudioFormatInfo {
            &self.format
        }

        fn total_bytes(&self) -> u64 {
            1024
        }

        fn next_access_unit(&mut self) -> Result<Option<AccessUnit>> {
            match self.units.pop_front() {
                None if self.fail_at_end => {
                    Err(WaveformError::SourceUnreadable("truncated".to_string()))
                }
                unit => Ok(unit),
            }
        }
    }

    /// Echoes each access unit back as PCM.
    #[derive(Default)]
    struct EchoDecoder {
        pending: VecDeque<DecoderOutput>,
        fed: Vec<usize>,
        emit_eos: bool,
        released: u32,
    }

    impl PcmDecoder for EchoDecoder {
        fn start(&mut self, _format: &AudioFormatInfo) -> Result<()> {
            Ok(())
        }

        fn dequeue_input(&mut self, _timeout: Duration) -> Result<bool> {
            Ok(true)
        }

        fn feed(&mut self, input: DecoderInput) -> Result<()> {
            match input {
                DecoderInput::Data(unit) => {
                    self.fed.push(unit.len());
                    self.pending
                        .push_back(DecoderOutput::Chunk(PcmChunk::new(unit.data)));
                }
                DecoderInput::EndOfStream => {
                    if self.emit_eos {
                        self.pending.push_back(DecoderOutput::EndOfStream);
                    }
                }
            }
            Ok(())
        }

        fn dequeue_output(&mut self, _timeout: Duration) -> Result<DecoderOutput> {
            Ok(self.pending.pop_front().unwrap_or(DecoderOutput::NothingReady))
        }

        fn release(&mut self) {
            self.released += 1;
        }
    }

    fn config() -> DecodeConfig {
        DecodeConfig {
            initial_capacity_bytes: 8,
            growth_margin_bytes: 16,
            eos_grace_polls: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_assembles_until_end_of_stream() {
        let format = AudioFormatInfo::new(1, 8_000, 0, "audio/raw");
        let mut reader = VecReader::new(format, vec![vec![1, 0, 2, 0], vec![3, 0]]);
        let mut decoder = EchoDecoder {
            emit_eos: true,
            ..Default::default()
        };

        let result = PcmAssembler::new(config())
            .assemble(&mut reader, &mut decoder, &CancellationToken::new())
            .unwrap();

        assert_eq!(result.outcome, AssemblyOutcome::EndOfStream);
        assert_eq!(result.pcm, vec![1, 2, 3]);
        assert_eq!(result.samples_decoded, 3);
        assert_eq!(result.stats.bytes_read, 6);
        assert_eq!(decoder.released, 1);
    }

    #[test]
    fn test_reader_failure_keeps_decoded_prefix() {
        let format = AudioFormatInfo::new(1, 8_000, 0, "audio/raw");
        let mut reader = VecReader::new(format, vec![vec![7, 0, 8, 0]]);
        reader.fail_at_end = true;
        let mut decoder = EchoDecoder {
            emit_eos: true,
            ..Default::default()
        };

        let result = PcmAssembler::new(config())
            .assemble(&mut reader, &mut decoder, &CancellationToken::new())
            .unwrap();

        assert_eq!(result.outcome, AssemblyOutcome::DecoderFailed);
        assert_eq!(result.pcm, vec![7, 8]);
        assert_eq!(decoder.released, 1);
    }

    #[test]
    fn test_missing_eos_ends_after_grace_polls() {
        let format = AudioFormatInfo::new(1, 8_000, 0, "audio/raw");
        let mut reader = VecReader::new(format, vec![vec![5, 0]]);
        let mut decoder = EchoDecoder::default();

        let result = PcmAssembler::new(config())
            .assemble(&mut reader, &mut decoder, &CancellationToken::new())
            .unwrap();

        assert_eq!(result.outcome, AssemblyOutcome::MissingEndOfStream);
        assert_eq!(result.pcm, vec![5]);
        assert_eq!(decoder.released, 1);
    }

    #[test]
    fn test_layout_change_updates_channels() {
        let format = AudioFormatInfo::new(2, 8_000, 0, "audio/raw");
        let mut reader = VecReader::new(format, vec![vec![1, 0, 2, 0, 3, 0]]);
        let mut decoder = EchoDecoder {
            emit_eos: true,
            ..Default::default()
        };
        decoder
            .pending
            .push_back(DecoderOutput::LayoutChanged(OutputLayout {
                channels: 1,
                sample_rate: 16_000,
            }));

        let result = PcmAssembler::new(config())
            .assemble(&mut reader, &mut decoder, &CancellationToken::new())
            .unwrap();

        assert_eq!(result.format.channels, 1);
        assert_eq!(result.format.sample_rate, 16_000);
        assert_eq!(result.samples_decoded, 3);
    }

    #[test]
    fn test_partial_trailing_frame_dropped() {
        let format = AudioFormatInfo::new(2, 8_000, 0, "audio/raw");
        let mut reader = VecReader::new(format, vec![vec![1, 0, 2, 0, 3, 0]]);
        let mut decoder = EchoDecoder {
            emit_eos: true,
            ..Default::default()
        };

        let result = PcmAssembler::new(config())
            .assemble(&mut reader, &mut decoder, &CancellationToken::new())
            .unwrap();

        assert_eq!(result.samples_decoded, 1);
        assert_eq!(result.pcm, vec![1, 2]);
    }

    #[test]
    fn test_cancelled_before_start_releases_decoder() {
        let format = AudioFormatInfo::new(1, 8_000, 0, "audio/raw");
        let mut reader = VecReader::new(format, vec![vec![1, 0]]);
        let mut decoder = EchoDecoder::default();
        let token = CancellationToken::new();
        token.cancel();

        let err = PcmAssembler::new(config())
            .assemble(&mut reader, &mut decoder, &token)
            .unwrap_err();

        assert!(matches!(err, WaveformError::Cancelled));
        assert_eq!(decoder.released, 1);
        assert!(decoder.fed.is_empty());
    }

    #[test]
    fn test_outcome_partial_classification() {
        assert!(AssemblyOutcome::AllocationExhausted.is_partial());
        assert!(AssemblyOutcome::DecoderFailed.is_partial());
        assert!(!AssemblyOutcome::EndOfStream.is_partial());
        assert!(!AssemblyOutcome::ExpectedSamplesReached.is_partial());
    }
}
