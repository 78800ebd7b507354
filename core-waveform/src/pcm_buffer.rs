//! # Growable PCM Buffer
//!
//! Single-writer buffer that accumulates interleaved 16-bit little-endian PCM
//! while a stream is being decoded. Incoming bytes are decoded into `i16`
//! samples as they are written, so the finished buffer hands its storage over
//! without another conversion pass.
//!
//! ## Design
//!
//! - **Capacity**: explicit, in bytes, starts at the configured initial size
//!   and only grows during a decode
//! - **Growth**: allocate-then-copy through a [`BufferAllocator`], so a failed
//!   allocation leaves the current contents untouched
//! - **Sizing**: [`extrapolated_capacity`] estimates the final decoded size from
//!   the share of compressed bytes consumed so far
//!
//! ## Usage
//!
//! ```rust
//! use core_waveform::pcm_buffer::{PcmBuffer, SystemAllocator};
//!
//! let mut buffer = PcmBuffer::allocate(4, &SystemAllocator, 1).unwrap();
//! buffer.write(&[0x01, 0x00, 0xff, 0xff]);
//! assert_eq!(buffer.remaining(), 0);
//!
//! buffer.grow_to(16, &SystemAllocator, 1).unwrap();
//! assert_eq!(buffer.samples(), &[1, -1]);
//! assert_eq!(buffer.into_samples(), vec![1, -1]);
//! ```

use thiserror::Error;
use tracing::{debug, warn};

/// An allocation attempt failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("failed to allocate {requested} bytes")]
pub struct AllocError {
    pub requested: usize,
}

/// Source of backing storage for [`PcmBuffer`].
///
/// The default [`SystemAllocator`] reports out-of-memory as an error instead
/// of aborting; tests substitute allocators that fail on demand.
#[cfg_attr(test, mockall::automock)]
pub trait BufferAllocator: Send + Sync {
    /// Return an empty sample vector able to hold at least `capacity_bytes`
    /// bytes of PCM.
    fn allocate(&self, capacity_bytes: usize) -> std::result::Result<Vec<i16>, AllocError>;
}

/// Allocator backed by the global heap via `try_reserve_exact`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl BufferAllocator for SystemAllocator {
    fn allocate(&self, capacity_bytes: usize) -> std::result::Result<Vec<i16>, AllocError> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(samples_for(capacity_bytes))
            .map_err(|_| AllocError {
                requested: capacity_bytes,
            })?;
        Ok(storage)
    }
}

/// Growable PCM buffer with an explicit write cursor.
#[derive(Debug)]
pub struct PcmBuffer {
    /// Complete samples written so far
    samples: Vec<i16>,
    /// Low byte of a sample split across two writes
    carry: Option<u8>,
    /// Logical capacity in bytes; the cursor never passes it
    capacity: usize,
    /// Successful resizes since creation
    growth_events: u32,
}

impl PcmBuffer {
    /// Allocate a buffer with the given byte capacity, retrying up to
    /// `retries` times.
    pub fn allocate(
        capacity: usize,
        allocator: &dyn BufferAllocator,
        retries: u32,
    ) -> std::result::Result<Self, AllocError> {
        let samples = allocate_with_retries(capacity, allocator, retries)?;
        Ok(Self {
            samples,
            carry: None,
            capacity,
            growth_events: 0,
        })
    }

    /// Zero-capacity buffer, used when even the initial allocation fails.
    pub fn empty() -> Self {
        Self {
            samples: Vec::new(),
            carry: None,
            capacity: 0,
            growth_events: 0,
        }
    }

    /// Current write position in bytes.
    pub fn position(&self) -> usize {
        self.samples.len() * 2 + usize::from(self.carry.is_some())
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free bytes left before a resize is needed.
    pub fn remaining(&self) -> usize {
        self.capacity - self.position()
    }

    /// Number of successful resizes.
    pub fn growth_events(&self) -> u32 {
        self.growth_events
    }

    /// Append little-endian PCM bytes at the write cursor.
    ///
    /// Returns the number of bytes written. Bytes beyond the remaining
    /// capacity are dropped, so callers grow the buffer first.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let to_write = bytes.len().min(self.remaining());
        if to_write < bytes.len() {
            warn!(
                "PCM buffer full, dropping {} of {} bytes",
                bytes.len() - to_write,
                bytes.len()
            );
        }

        let mut rest = &bytes[..to_write];
        if let Some(low) = self.carry {
            if let Some((&high, tail)) = rest.split_first() {
                self.samples.push(i16::from_le_bytes([low, high]));
                self.carry = None;
                rest = tail;
            }
        }

        let pairs = rest.chunks_exact(2);
        self.carry = pairs.remainder().first().copied().or(self.carry);
        self.samples
            .extend(pairs.map(|pair| i16::from_le_bytes([pair[0], pair[1]])));
        to_write
    }

    /// Replace the backing storage with a larger one, preserving contents and
    /// write cursor.
    ///
    /// Requests that do not exceed the current capacity are no-ops. On
    /// failure the buffer is left unchanged.
    pub fn grow_to(
        &mut self,
        new_capacity: usize,
        allocator: &dyn BufferAllocator,
        retries: u32,
    ) -> std::result::Result<(), AllocError> {
        if new_capacity <= self.capacity {
            return Ok(());
        }

        let mut grown = allocate_with_retries(new_capacity, allocator, retries)?;
        grown.extend_from_slice(&self.samples);

        debug!(
            "Grew PCM buffer from {} to {} bytes at position {}",
            self.capacity,
            new_capacity,
            self.position()
        );

        self.samples = grown;
        self.capacity = new_capacity;
        self.growth_events += 1;
        Ok(())
    }

    /// Complete samples written so far.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of complete frames written for the given channel count.
    pub fn frames(&self, channels: u16) -> u64 {
        if channels == 0 {
            return 0;
        }
        (self.samples.len() / channels as usize) as u64
    }

    /// Consume the buffer into its interleaved samples without copying. A
    /// dangling half sample is discarded.
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

fn samples_for(capacity_bytes: usize) -> usize {
    capacity_bytes.div_ceil(2)
}

fn allocate_with_retries(
    capacity: usize,
    allocator: &dyn BufferAllocator,
    retries: u32,
) -> std::result::Result<Vec<i16>, AllocError> {
    let attempts = retries.max(1);
    let mut last_error = AllocError {
        requested: capacity,
    };

    for attempt in 1..=attempts {
        match allocator.allocate(capacity) {
            Ok(storage) => return Ok(storage),
            Err(e) => {
                warn!(
                    "Allocation of {} bytes failed (attempt {}/{})",
                    capacity, attempt, attempts
                );
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// New capacity for a buffer that cannot fit the next chunk.
///
/// Extrapolates the final decoded size from the fraction of source bytes
/// consumed (`position * total / read * headroom`), then makes sure the result
/// leaves at least `chunk_len + margin` bytes past the current position.
pub fn extrapolated_capacity(
    position: usize,
    chunk_len: usize,
    total_source_bytes: u64,
    bytes_read: u64,
    headroom: f64,
    margin: usize,
) -> usize {
    let estimate = if bytes_read > 0 {
        (position as f64 * (total_source_bytes as f64 / bytes_read as f64) * headroom) as usize
    } else {
        0
    };

    let minimum_headroom = chunk_len.saturating_add(margin);
    if estimate.saturating_sub(position) < minimum_headroom {
        position.saturating_add(minimum_headroom)
    } else {
        estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const MIB: usize = 1 << 20;

    #[test]
    fn test_write_and_remaining() {
        let mut buffer = PcmBuffer::allocate(8, &SystemAllocator, 1).unwrap();
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.write(&[1, 2, 3, 4]), 4);
        assert_eq!(buffer.position(), 4);
        assert_eq!(buffer.remaining(), 4);
    }

    #[test]
    fn test_write_never_passes_capacity() {
        let mut buffer = PcmBuffer::allocate(3, &SystemAllocator, 1).unwrap();
        assert_eq!(buffer.write(&[1, 2, 3, 4, 5]), 3);
        assert_eq!(buffer.position(), buffer.capacity());
    }

    #[test]
    fn test_grow_preserves_contents() {
        let mut buffer = PcmBuffer::allocate(4, &SystemAllocator, 1).unwrap();
        buffer.write(&[9, 8, 7, 6]);
        buffer.grow_to(64, &SystemAllocator, 1).unwrap();

        assert_eq!(buffer.capacity(), 64);
        assert_eq!(buffer.position(), 4);
        assert_eq!(buffer.samples(), &[i16::from_le_bytes([9, 8]), i16::from_le_bytes([7, 6])]);
        assert_eq!(buffer.growth_events(), 1);
    }

    #[test]
    fn test_grow_never_shrinks() {
        let mut buffer = PcmBuffer::allocate(32, &SystemAllocator, 1).unwrap();
        buffer.grow_to(16, &SystemAllocator, 1).unwrap();
        assert_eq!(buffer.capacity(), 32);
        assert_eq!(buffer.growth_events(), 0);
    }

    #[test]
    fn test_failed_growth_keeps_buffer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut allocator = MockBufferAllocator::new();
        allocator.expect_allocate().returning(move |capacity| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Vec::with_capacity(capacity / 2))
            } else {
                Err(AllocError {
                    requested: capacity,
                })
            }
        });

        let mut buffer = PcmBuffer::allocate(4, &allocator, 10).unwrap();
        buffer.write(&[1, 2, 3, 4]);

        let err = buffer.grow_to(128, &allocator, 10).unwrap_err();
        assert_eq!(err.requested, 128);
        // one initial allocation plus ten failed retries
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        assert_eq!(buffer.capacity(), 4);
        assert_eq!(buffer.samples(), &[0x0201, 0x0403]);
    }

    #[test]
    fn test_retry_recovers_after_transient_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut allocator = MockBufferAllocator::new();
        allocator.expect_allocate().returning(move |capacity| {
            if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(AllocError {
                    requested: capacity,
                })
            } else {
                Ok(Vec::with_capacity(capacity / 2))
            }
        });

        let buffer = PcmBuffer::allocate(16, &allocator, 10).unwrap();
        assert_eq!(buffer.capacity(), 16);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_frames_and_samples() {
        let mut buffer = PcmBuffer::allocate(16, &SystemAllocator, 1).unwrap();
        // two stereo frames: (1, -1), (256, -32768)
        buffer.write(&[0x01, 0x00, 0xff, 0xff, 0x00, 0x01, 0x00, 0x80]);
        assert_eq!(buffer.frames(2), 2);
        assert_eq!(buffer.frames(1), 4);
        assert_eq!(buffer.frames(0), 0);
        assert_eq!(buffer.into_samples(), vec![1, -1, 256, i16::MIN]);
    }

    #[test]
    fn test_sample_split_across_writes() {
        let mut buffer = PcmBuffer::allocate(8, &SystemAllocator, 1).unwrap();
        assert_eq!(buffer.write(&[0x34, 0x12, 0x01]), 3);
        assert_eq!(buffer.position(), 3);
        assert_eq!(buffer.samples(), &[0x1234]);

        assert_eq!(buffer.write(&[0x80, 0xff, 0x7f]), 3);
        assert_eq!(buffer.position(), 6);
        assert_eq!(buffer.samples(), &[0x1234, i16::MIN + 1, 0x7fff]);
    }

    #[test]
    fn test_into_samples_reuses_storage() {
        let mut buffer = PcmBuffer::allocate(64, &SystemAllocator, 1).unwrap();
        buffer.write(&[1, 0, 2, 0]);
        let start = buffer.samples().as_ptr();

        let samples = buffer.into_samples();
        assert_eq!(samples, vec![1, 2]);
        assert_eq!(samples.as_ptr(), start);
        assert!(samples.capacity() >= 32);
    }

    #[test]
    fn test_extrapolation_uses_source_fraction() {
        // 1 MiB decoded from a quarter of the source -> 4 MiB * 1.2
        let capacity = extrapolated_capacity(MIB, 4096, 400_000, 100_000, 1.2, 64 * 1024);
        assert_eq!(capacity, (MIB as f64 * 4.0 * 1.2) as usize);
    }

    #[test]
    fn test_extrapolation_enforces_margin() {
        // Nearly all of the source consumed: the estimate is too close to
        // the current position, so the margin wins.
        let capacity = extrapolated_capacity(MIB, 4096, 100_000, 99_000, 1.2, 5 * MIB);
        assert_eq!(capacity, MIB + 4096 + 5 * MIB);
    }

    #[test]
    fn test_extrapolation_without_progress() {
        let capacity = extrapolated_capacity(MIB, 4096, 100_000, 0, 1.2, 5 * MIB);
        assert_eq!(capacity, MIB + 4096 + 5 * MIB);
    }
}
