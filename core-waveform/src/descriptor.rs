//! # Sound Descriptor
//!
//! Immutable result of a finished decode: stream metadata, the derived
//! average bit rate, the decode-time preview envelope, and (for descriptors
//! built in-process) the full PCM buffer.
//!
//! ## Wire Form
//!
//! ```text
//! i64  duration_us
//! u32  codec length, then UTF-8 codec bytes
//! i32  average_bit_rate (kbps)
//! i32  reduced_block_count
//! i32  sample_rate
//! i16 x reduced_block_count   preview envelope
//! ```
//!
//! All values little-endian, no padding, no checksum. The full PCM buffer is
//! never transferred; a restored descriptor carries the preview envelope only.
//! Serde serialization is one-way: it reports the metadata and skips both
//! sample runs. Restoring a descriptor goes through the wire form only.

use crate::assembler::AssembledPcm;
use crate::error::{Result, WaveformError};
use crate::reducer::{self, AggregationStrategy, BlockGeometry, BlockSummary};
use crate::traits::AudioFormatInfo;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Finished decode result.
#[derive(Debug, Clone, Serialize)]
pub struct SoundDescriptor {
    duration_us: u64,
    codec: String,
    average_bit_rate: i32,
    reduced_block_count: usize,
    sample_rate: u32,
    channels: u16,
    samples_decoded: u64,
    #[serde(skip)]
    preview: Arc<[i16]>,
    /// Storage handed over by the assembler, shared without copying
    #[serde(skip)]
    pcm: Option<Arc<Vec<i16>>>,
}

impl SoundDescriptor {
    /// Build the descriptor for an assembled stream, computing the preview
    /// envelope at `samples_per_preview_block` frames per block.
    pub fn from_assembly(assembled: AssembledPcm, samples_per_preview_block: u32) -> Self {
        let AssembledPcm {
            format,
            pcm,
            samples_decoded,
            source_bytes,
            ..
        } = assembled;

        let block_count =
            reducer::preview_block_count(samples_decoded, format.channels, samples_per_preview_block);
        let preview = reducer::preview_envelope(&pcm, format.channels, block_count);
        let average_bit_rate = average_bit_rate(source_bytes, format.sample_rate, samples_decoded);

        debug!(
            block_count,
            average_bit_rate,
            samples_decoded,
            "Built sound descriptor"
        );

        Self {
            duration_us: format.duration_us,
            codec: format.codec,
            average_bit_rate,
            reduced_block_count: block_count,
            sample_rate: format.sample_rate,
            channels: format.channels,
            samples_decoded,
            preview: Arc::from(preview),
            pcm: Some(Arc::new(pcm)),
        }
    }

    pub fn duration_us(&self) -> u64 {
        self.duration_us
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    /// Average bit rate in kbps.
    pub fn average_bit_rate(&self) -> i32 {
        self.average_bit_rate
    }

    /// Number of blocks in the preview envelope.
    pub fn reduced_block_count(&self) -> usize {
        self.reduced_block_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Frames per channel. Zero for descriptors restored from the wire form.
    pub fn samples_decoded(&self) -> u64 {
        self.samples_decoded
    }

    /// Returns `true` if the decode produced no audio.
    pub fn is_empty(&self) -> bool {
        self.reduced_block_count == 0
    }

    /// Format metadata as reported at the end of the decode.
    pub fn format(&self) -> AudioFormatInfo {
        AudioFormatInfo::new(
            self.channels,
            self.sample_rate,
            self.duration_us,
            self.codec.clone(),
        )
    }

    /// Preview envelope, one magnitude per block.
    pub fn preview(&self) -> &[i16] {
        &self.preview
    }

    /// Full interleaved PCM, when the descriptor was built in-process.
    pub fn pcm(&self) -> Option<&[i16]> {
        self.pcm.as_deref().map(Vec::as_slice)
    }

    /// Shared handle to the full PCM buffer.
    pub fn pcm_shared(&self) -> Option<Arc<Vec<i16>>> {
        self.pcm.clone()
    }

    /// Reduce this descriptor's audio to the requested geometry.
    ///
    /// Uses the full PCM when present, otherwise the mono preview envelope.
    pub fn reduce(
        &self,
        geometry: &BlockGeometry,
        strategy: AggregationStrategy,
    ) -> Result<Vec<BlockSummary>> {
        geometry.validate()?;
        Ok(match &self.pcm {
            Some(pcm) => reducer::reduce(pcm, self.channels, geometry, strategy),
            None => reducer::reduce(&self.preview, 1, geometry, strategy),
        })
    }

    /// Encode into the wire form.
    pub fn to_wire_bytes(&self) -> Bytes {
        let codec = self.codec.as_bytes();
        let mut buf = BytesMut::with_capacity(24 + codec.len() + self.preview.len() * 2);

        buf.put_i64_le(i64::try_from(self.duration_us).unwrap_or(i64::MAX));
        buf.put_u32_le(codec.len() as u32);
        buf.put_slice(codec);
        buf.put_i32_le(self.average_bit_rate);
        buf.put_i32_le(self.preview.len() as i32);
        buf.put_i32_le(self.sample_rate as i32);
        for &sample in self.preview.iter() {
            buf.put_i16_le(sample);
        }

        buf.freeze()
    }

    /// Decode the wire form.
    ///
    /// The restored descriptor is mono, holds no full PCM buffer, and reports
    /// zero decoded samples.
    ///
    /// # Errors
    ///
    /// `WireFormat` if the payload is truncated, carries trailing bytes, or
    /// holds out-of-range values.
    pub fn from_wire_bytes(mut buf: impl Buf) -> Result<Self> {
        let duration_us = read_i64(&mut buf, "duration")?;
        let duration_us = u64::try_from(duration_us)
            .map_err(|_| wire_error(format!("negative duration {}", duration_us)))?;

        let codec_len = read_u32(&mut buf, "codec length")? as usize;
        ensure_remaining(&buf, codec_len, "codec")?;
        let codec_bytes = buf.copy_to_bytes(codec_len);
        let codec = String::from_utf8(codec_bytes.to_vec())
            .map_err(|e| wire_error(format!("codec is not UTF-8: {}", e)))?;

        let average_bit_rate = read_i32(&mut buf, "average bit rate")?;
        let block_count = read_i32(&mut buf, "block count")?;
        let block_count = usize::try_from(block_count)
            .map_err(|_| wire_error(format!("negative block count {}", block_count)))?;
        let sample_rate = read_i32(&mut buf, "sample rate")?;
        let sample_rate = u32::try_from(sample_rate)
            .map_err(|_| wire_error(format!("negative sample rate {}", sample_rate)))?;

        let sample_bytes = block_count
            .checked_mul(2)
            .ok_or_else(|| wire_error(format!("block count {} overflows", block_count)))?;
        ensure_remaining(&buf, sample_bytes, "samples")?;
        let preview: Vec<i16> = (0..block_count).map(|_| buf.get_i16_le()).collect();

        if buf.has_remaining() {
            return Err(wire_error(format!(
                "{} trailing bytes after samples",
                buf.remaining()
            )));
        }

        Ok(Self {
            duration_us,
            codec,
            average_bit_rate,
            reduced_block_count: block_count,
            sample_rate,
            channels: 1,
            samples_decoded: 0,
            preview: Arc::from(preview),
            pcm: None,
        })
    }
}

/// Average bit rate in kbps: `source_bytes * 8 * sample_rate / samples / 1000`.
///
/// Zero when nothing was decoded.
pub fn average_bit_rate(source_bytes: u64, sample_rate: u32, samples_decoded: u64) -> i32 {
    if samples_decoded == 0 {
        return 0;
    }
    let bits_per_second =
        source_bytes as f64 * 8.0 * sample_rate as f64 / samples_decoded as f64;
    (bits_per_second / 1000.0) as i32
}

fn wire_error(message: String) -> WaveformError {
    WaveformError::WireFormat(message)
}

fn ensure_remaining(buf: &impl Buf, needed: usize, field: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(wire_error(format!(
            "truncated {}: need {} bytes, have {}",
            field,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

fn read_i64(buf: &mut impl Buf, field: &str) -> Result<i64> {
    ensure_remaining(buf, 8, field)?;
    Ok(buf.get_i64_le())
}

fn read_u32(buf: &mut impl Buf, field: &str) -> Result<u32> {
    ensure_remaining(buf, 4, field)?;
    Ok(buf.get_u32_le())
}

fn read_i32(buf: &mut impl Buf, field: &str) -> Result<i32> {
    ensure_remaining(buf, 4, field)?;
    Ok(buf.get_i32_le())
}
