//! # Sample Format Converter
//!
//! Normalizes whatever Symphonia decodes (any sample type, planar layout)
//! into interleaved 16-bit little-endian PCM bytes.

use bytes::{BufMut, Bytes, BytesMut};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};

/// Converts decoded Symphonia buffers to interleaved i16 LE bytes.
pub struct SampleConverter;

impl SampleConverter {
    /// Convert a decoded buffer of any sample format.
    ///
    /// Float samples are clamped to `[-1.0, 1.0]` before conversion; integer
    /// formats are rescaled to the 16-bit range.
    pub fn to_interleaved_i16_le(decoded: AudioBufferRef<'_>) -> Bytes {
        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            return Bytes::new();
        }

        let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);

        let interleaved = samples.samples();
        let mut out = BytesMut::with_capacity(interleaved.len() * 2);
        for &sample in interleaved {
            out.put_i16_le(sample);
        }
        out.freeze()
    }
}
