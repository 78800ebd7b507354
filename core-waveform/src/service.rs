//! # Waveform Service
//!
//! Entry point for hosts: opens a source, assembles its PCM and builds a
//! [`SoundDescriptor`], off the caller's thread.
//!
//! Decoding is CPU-bound and synchronous, so the async methods run it on
//! tokio's blocking pool and hand the result back as a future. A dropped
//! future does not stop the blocking work; cancel the token for that.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_waveform::{AudioSource, BlockGeometry, DecodeConfig, WaveformService};
//! use core_waveform::reducer::AggregationStrategy;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> core_waveform::Result<()> {
//! let service = WaveformService::with_symphonia(DecodeConfig::default())?;
//! let descriptor = service
//!     .decode(AudioSource::file("/music/track.mp3"), CancellationToken::new())
//!     .await?;
//!
//! let blocks = WaveformService::reduce(
//!     descriptor,
//!     BlockGeometry::for_display(320, 48, 2, 1, 1, true),
//!     AggregationStrategy::MaxEnvelope,
//! )
//! .await?;
//! println!("{} blocks", blocks.len());
//! # Ok(())
//! # }
//! ```

use crate::assembler::PcmAssembler;
use crate::config::DecodeConfig;
use crate::descriptor::SoundDescriptor;
use crate::error::{Result, WaveformError};
use crate::pcm_buffer::{BufferAllocator, SystemAllocator};
use crate::reducer::{AggregationStrategy, BlockGeometry, BlockSummary};
use crate::traits::{AudioSource, DecoderBackend, OpenedStream};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Decodes sources into sound descriptors on the blocking pool.
#[derive(Clone)]
pub struct WaveformService {
    config: DecodeConfig,
    backend: Arc<dyn DecoderBackend>,
    allocator: Arc<dyn BufferAllocator>,
}

impl WaveformService {
    /// Create a service over the given decoder backend.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(backend: Arc<dyn DecoderBackend>, config: DecodeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            allocator: Arc::new(SystemAllocator),
        })
    }

    /// Create a service backed by Symphonia.
    #[cfg(feature = "core-decoder")]
    pub fn with_symphonia(config: DecodeConfig) -> Result<Self> {
        let backend = Arc::new(crate::decoder::SymphoniaBackend::new(config.clone()));
        Self::new(backend, config)
    }

    /// Replace the PCM buffer allocator.
    pub fn with_allocator(mut self, allocator: Arc<dyn BufferAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decode `source` on the current thread.
    ///
    /// # Errors
    ///
    /// - `SourceUnreadable` / `NoAudioTrack` / `UnsupportedCodec` from the
    ///   backend
    /// - `Cancelled` if `cancel` fires first
    ///
    /// Allocation exhaustion and mid-stream decoder failures are not errors:
    /// the descriptor covers whatever was decoded.
    #[instrument(skip(self, source, cancel))]
    pub fn decode_blocking(
        &self,
        source: &AudioSource,
        cancel: &CancellationToken,
    ) -> Result<SoundDescriptor> {
        if cancel.is_cancelled() {
            return Err(WaveformError::Cancelled);
        }

        let OpenedStream {
            mut reader,
            mut decoder,
        } = self.backend.open(source)?;

        let assembler = PcmAssembler::with_allocator(self.config.clone(), Arc::clone(&self.allocator));
        let assembled = assembler.assemble(reader.as_mut(), decoder.as_mut(), cancel)?;

        if assembled.outcome.is_partial() {
            warn!(
                outcome = ?assembled.outcome,
                samples_decoded = assembled.samples_decoded,
                "Waveform built from partial audio"
            );
        }

        let descriptor =
            SoundDescriptor::from_assembly(assembled, self.config.samples_per_preview_block);
        info!(
            codec = descriptor.codec(),
            samples_decoded = descriptor.samples_decoded(),
            average_bit_rate = descriptor.average_bit_rate(),
            "Decoded sound descriptor"
        );
        Ok(descriptor)
    }

    /// Decode `source` on tokio's blocking pool.
    pub async fn decode(
        &self,
        source: AudioSource,
        cancel: CancellationToken,
    ) -> Result<Arc<SoundDescriptor>> {
        let service = self.clone();
        let descriptor = tokio::task::spawn_blocking(move || service.decode_blocking(&source, &cancel))
            .await
            .map_err(|e| WaveformError::Internal(format!("Decode task failed: {}", e)))??;
        Ok(Arc::new(descriptor))
    }

    /// Reduce a descriptor to the requested geometry on tokio's blocking
    /// pool.
    pub async fn reduce(
        descriptor: Arc<SoundDescriptor>,
        geometry: BlockGeometry,
        strategy: AggregationStrategy,
    ) -> Result<Vec<BlockSummary>> {
        tokio::task::spawn_blocking(move || descriptor.reduce(&geometry, strategy))
            .await
            .map_err(|e| WaveformError::Internal(format!("Reduce task failed: {}", e)))?
    }
}

impl std::fmt::Debug for WaveformService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveformService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
