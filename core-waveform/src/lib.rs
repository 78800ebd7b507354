//! # Waveform Extraction
//!
//! Turns compressed audio into a compact amplitude profile for drawing a
//! waveform strip with a playback-progress overlay.
//!
//! ## Overview
//!
//! - [`assembler`]: drives a decoder adapter and collects every decoded PCM
//!   chunk into one growable buffer
//! - [`reducer`]: summarizes the PCM into a fixed number of blocks
//! - [`progress`]: maps a playback fraction onto the block grid
//! - [`descriptor`]: the immutable decode result and its wire form
//! - [`service`]: runs decode and reduce on tokio's blocking pool
//! - [`decoder`]: Symphonia-backed adapter (feature `core-decoder`)
//!
//! ```text
//! AudioSource → DecoderBackend → PcmAssembler → SoundDescriptor → reduce → [BlockSummary]
//!                                                                    ↑
//!                                                   block_index(progress)
//! ```

pub mod assembler;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod pcm_buffer;
pub mod progress;
pub mod reducer;
pub mod service;
pub mod traits;

#[cfg(feature = "core-decoder")]
pub mod decoder;

pub use assembler::{AssembledPcm, AssemblyOutcome, AssemblyStats, PcmAssembler};
pub use config::DecodeConfig;
pub use descriptor::SoundDescriptor;
pub use error::{Result, WaveformError};
pub use pcm_buffer::{BufferAllocator, PcmBuffer, SystemAllocator};
pub use progress::{block_index, BlockState};
pub use reducer::{reduce, AggregationStrategy, BlockGeometry, BlockSummary};
pub use service::WaveformService;
pub use traits::{
    AccessUnit, AccessUnitReader, AudioFormatInfo, AudioSource, DecoderBackend, DecoderInput,
    DecoderOutput, OpenedStream, OutputLayout, PcmChunk, PcmDecoder,
};

#[cfg(feature = "core-decoder")]
pub use decoder::SymphoniaBackend;
