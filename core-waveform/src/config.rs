//! # Decode Configuration
//!
//! Tunables for the streaming PCM assembler and the Symphonia adapter.

use crate::error::{Result, WaveformError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One mebibyte.
pub const MIB: usize = 1 << 20;

/// Decode pipeline configuration.
///
/// The growth parameters are tuned so long streams resize their PCM buffer
/// about once: the first resize extrapolates the final size from the share of
/// source bytes consumed so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Initial PCM buffer capacity in bytes.
    ///
    /// Default: 1 MiB (~6 seconds of 16-bit stereo at 44.1 kHz).
    #[serde(default = "default_initial_capacity_bytes")]
    pub initial_capacity_bytes: usize,

    /// Minimum headroom beyond the current write position after a resize.
    ///
    /// Default: 5 MiB.
    #[serde(default = "default_growth_margin_bytes")]
    pub growth_margin_bytes: usize,

    /// Multiplier applied to the extrapolated final size.
    ///
    /// Default: 1.2 (20% over the estimate).
    #[serde(default = "default_growth_headroom")]
    pub growth_headroom: f64,

    /// Allocation attempts per resize before decoding stops with partial data.
    ///
    /// Default: 10.
    #[serde(default = "default_allocation_retries")]
    pub allocation_retries: u32,

    /// Bounded wait for a decoder input or output slot.
    ///
    /// Default: 100 µs.
    #[serde(default = "default_dequeue_timeout")]
    pub dequeue_timeout: Duration,

    /// Idle output polls tolerated after end-of-stream was submitted before
    /// the decoder is assumed to have swallowed its end-of-stream signal.
    ///
    /// Default: 10 000.
    #[serde(default = "default_eos_grace_polls")]
    pub eos_grace_polls: u32,

    /// Frames summarized by one block of the preview envelope.
    ///
    /// Default: 50.
    #[serde(default = "default_samples_per_preview_block")]
    pub samples_per_preview_block: u32,

    /// Decoded chunks the Symphonia adapter may hold before it stops
    /// accepting input.
    ///
    /// Default: 8.
    #[serde(default = "default_max_pending_chunks")]
    pub max_pending_chunks: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            initial_capacity_bytes: default_initial_capacity_bytes(),
            growth_margin_bytes: default_growth_margin_bytes(),
            growth_headroom: default_growth_headroom(),
            allocation_retries: default_allocation_retries(),
            dequeue_timeout: default_dequeue_timeout(),
            eos_grace_polls: default_eos_grace_polls(),
            samples_per_preview_block: default_samples_per_preview_block(),
            max_pending_chunks: default_max_pending_chunks(),
        }
    }
}

impl DecodeConfig {
    /// Configuration for memory-constrained hosts.
    ///
    /// - Smaller initial buffer (256 KiB)
    /// - Smaller resize margin (1 MiB)
    /// - Shallower decoder look-ahead
    pub fn low_memory() -> Self {
        Self {
            initial_capacity_bytes: 256 * 1024,
            growth_margin_bytes: MIB,
            max_pending_chunks: 2,
            ..Default::default()
        }
    }

    /// Configuration for long-form audio (podcasts, DJ sets).
    ///
    /// - Larger initial buffer (16 MiB)
    /// - Larger resize margin (32 MiB)
    /// - Coarser preview blocks
    pub fn long_form() -> Self {
        Self {
            initial_capacity_bytes: 16 * MIB,
            growth_margin_bytes: 32 * MIB,
            samples_per_preview_block: 200,
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| WaveformError::InvalidConfig(format!("Invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.initial_capacity_bytes == 0 {
            return Err(WaveformError::InvalidConfig(
                "initial_capacity_bytes must be > 0".to_string(),
            ));
        }

        if !(self.growth_headroom.is_finite() && self.growth_headroom >= 1.0) {
            return Err(WaveformError::InvalidConfig(
                "growth_headroom must be a finite value >= 1.0".to_string(),
            ));
        }

        if self.allocation_retries == 0 {
            return Err(WaveformError::InvalidConfig(
                "allocation_retries must be > 0".to_string(),
            ));
        }

        if self.samples_per_preview_block == 0 {
            return Err(WaveformError::InvalidConfig(
                "samples_per_preview_block must be > 0".to_string(),
            ));
        }

        if self.max_pending_chunks == 0 {
            return Err(WaveformError::InvalidConfig(
                "max_pending_chunks must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_initial_capacity_bytes() -> usize {
    MIB
}

fn default_growth_margin_bytes() -> usize {
    5 * MIB
}

fn default_growth_headroom() -> f64 {
    1.2
}

fn default_allocation_retries() -> u32 {
    10
}

fn default_dequeue_timeout() -> Duration {
    Duration::from_micros(100)
}

fn default_eos_grace_polls() -> u32 {
    10_000
}

fn default_samples_per_preview_block() -> u32 {
    50
}

fn default_max_pending_chunks() -> usize {
    8
}
