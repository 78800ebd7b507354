//! # Sample Reducer
//!
//! Turns millions of interleaved PCM samples into a small, fixed number of
//! per-block amplitude summaries suitable for drawing.
//!
//! ## Partitioning
//!
//! The interleaved sample run (whole frames only) is divided into
//! `block_count` spans of `total / block_count` samples each. Remainder samples
//! at the tail are not visited. Block `i` always summarizes the `i`-th
//! chronological span, so the output is exactly `block_count` long and never
//! depends on evaluation order.
//!
//! ## Strategies
//!
//! | Strategy | `track_negative = false` | `track_negative = true` |
//! |----------|--------------------------|-------------------------|
//! | [`AggregationStrategy::MaxEnvelope`] | `(max abs(s), 0)` | `(max s, min s)` |
//! | [`AggregationStrategy::AverageMagnitude`] | `(mean abs(s), 0)` | `(mean of s > 0, mean of s < 0)` |
//!
//! Raw values are multiplied by [`BlockGeometry::scale`] and saturated into
//! the `i16` range.

use crate::error::{Result, WaveformError};
use serde::{Deserialize, Serialize};

/// How one block's span of samples is summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// Loudest excursion in the span
    #[default]
    MaxEnvelope,
    /// Mean magnitude over the span
    AverageMagnitude,
}

impl AggregationStrategy {
    /// Summarize one span of interleaved samples into raw
    /// `(positive, negative)` values.
    ///
    /// All channels are visited; `negative` is 0 when `track_negative` is off.
    pub fn summarize(self, span: &[i16], track_negative: bool) -> (i32, i32) {
        match self {
            AggregationStrategy::MaxEnvelope => max_envelope(span, track_negative),
            AggregationStrategy::AverageMagnitude => average_magnitude(span, track_negative),
        }
    }
}

fn max_envelope(span: &[i16], track_negative: bool) -> (i32, i32) {
    if track_negative {
        span.iter().fold((0i32, 0i32), |(high, low), &s| {
            let s = s as i32;
            (high.max(s), low.min(s))
        })
    } else {
        let peak = span.iter().map(|&s| (s as i32).abs()).max().unwrap_or(0);
        (peak, 0)
    }
}

fn average_magnitude(span: &[i16], track_negative: bool) -> (i32, i32) {
    if track_negative {
        let (mut pos_sum, mut pos_count) = (0i64, 0i64);
        let (mut neg_sum, mut neg_count) = (0i64, 0i64);
        for &s in span {
            if s > 0 {
                pos_sum += s as i64;
                pos_count += 1;
            } else if s < 0 {
                neg_sum += s as i64;
                neg_count += 1;
            }
        }
        let positive = if pos_count > 0 { pos_sum / pos_count } else { 0 };
        let negative = if neg_count > 0 { neg_sum / neg_count } else { 0 };
        (positive as i32, negative as i32)
    } else {
        if span.is_empty() {
            return (0, 0);
        }
        let sum: i64 = span.iter().map(|&s| (s as i64).abs()).sum();
        ((sum / span.len() as i64) as i32, 0)
    }
}

/// Caller-supplied reduction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockGeometry {
    /// Number of blocks to produce
    pub block_count: usize,
    /// Whether the negative excursion is summarized separately
    pub track_negative: bool,
    /// Maps the 16-bit amplitude range onto the caller's display range
    pub scale: f32,
}

impl BlockGeometry {
    /// Geometry with negative tracking off and unit scale.
    pub fn new(block_count: usize) -> Self {
        Self {
            block_count,
            track_negative: false,
            scale: 1.0,
        }
    }

    pub fn with_negative(mut self, track_negative: bool) -> Self {
        self.track_negative = track_negative;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Derive geometry from a horizontal strip of `width` x `height` pixels
    /// filled with bars `block_size` wide separated by `block_margin`.
    ///
    /// Bars grow from an origin line: the vertical center when negative
    /// amplitudes are displayed, the bottom edge otherwise. `min_height` is
    /// reserved around the origin, and a full-scale sample reaches the top.
    pub fn for_display(
        width: u32,
        height: u32,
        block_size: u32,
        block_margin: u32,
        min_height: u32,
        display_negative: bool,
    ) -> Self {
        let stride = block_size.saturating_add(block_margin).max(1);
        let block_count = (width.saturating_sub(block_margin) / stride) as usize;

        let top_origin = if display_negative {
            height as f32 / 2.0 - min_height as f32
        } else {
            height.saturating_sub(min_height) as f32
        };

        Self {
            block_count,
            track_negative: display_negative,
            scale: top_origin.max(0.0) / i16::MAX as f32,
        }
    }

    /// Validate geometry values.
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale < 0.0 {
            return Err(WaveformError::InvalidGeometry(format!(
                "scale must be finite and non-negative, got {}",
                self.scale
            )));
        }
        Ok(())
    }
}

/// One block's representative amplitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockSummary {
    /// Positive excursion, or magnitude when negative tracking is off
    pub positive: i16,
    /// Negative excursion; 0 when negative tracking is off
    pub negative: i16,
}

impl BlockSummary {
    pub fn new(positive: i16, negative: i16) -> Self {
        Self { positive, negative }
    }
}

/// Reduce interleaved PCM into exactly `geometry.block_count` summaries.
///
/// Trailing samples that do not form a whole frame, and the remainder left by
/// the integer division into spans, are ignored. When there are fewer samples
/// than blocks every block summarizes an empty span.
pub fn reduce(
    pcm: &[i16],
    channel_count: u16,
    geometry: &BlockGeometry,
    strategy: AggregationStrategy,
) -> Vec<BlockSummary> {
    let block_count = geometry.block_count;
    if block_count == 0 {
        return Vec::new();
    }

    let channels = channel_count.max(1) as usize;
    let total_interleaved = (pcm.len() / channels) * channels;
    let span = total_interleaved / block_count;

    (0..block_count)
        .map(|block| {
            let start = block * span;
            let samples = &pcm[start..start + span];
            let (positive, negative) = strategy.summarize(samples, geometry.track_negative);
            BlockSummary {
                positive: scale_value(positive, geometry.scale),
                negative: if geometry.track_negative {
                    scale_value(negative, geometry.scale)
                } else {
                    0
                },
            }
        })
        .collect()
}

/// Block count of the preview envelope computed at decode time: one block per
/// `samples_per_block` frames, plus one when the interleaved run does not
/// divide evenly.
pub fn preview_block_count(samples_decoded: u64, channel_count: u16, samples_per_block: u32) -> usize {
    if samples_decoded == 0 {
        return 0;
    }
    let total = samples_decoded * channel_count.max(1) as u64;
    let mut blocks = (samples_decoded / samples_per_block.max(1) as u64).max(1);
    if total % blocks != 0 {
        blocks += 1;
    }
    blocks as usize
}

/// Max-envelope magnitudes at unit scale, one per preview block.
pub fn preview_envelope(pcm: &[i16], channel_count: u16, block_count: usize) -> Vec<i16> {
    reduce(
        pcm,
        channel_count,
        &BlockGeometry::new(block_count),
        AggregationStrategy::MaxEnvelope,
    )
    .into_iter()
    .map(|summary| summary.positive)
    .collect()
}

fn scale_value(raw: i32, scale: f32) -> i16 {
    // float-to-int casts saturate
    (raw as f32 * scale) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_envelope_signed() {
        let span = [0, 100, -200, 50];
        assert_eq!(AggregationStrategy::MaxEnvelope.summarize(&span, true), (100, -200));
    }

    #[test]
    fn test_max_envelope_magnitude() {
        let span = [0, 100, -200, 50];
        assert_eq!(AggregationStrategy::MaxEnvelope.summarize(&span, false), (200, 0));
    }

    #[test]
    fn test_max_envelope_all_negative_span() {
        // the positive side never drops below the origin
        let span = [-5, -10, -1];
        assert_eq!(AggregationStrategy::MaxEnvelope.summarize(&span, true), (0, -10));
    }

    #[test]
    fn test_average_signed() {
        let span = [10, -10, 20, -30];
        assert_eq!(AggregationStrategy::AverageMagnitude.summarize(&span, true), (15, -20));
    }

    #[test]
    fn test_average_magnitude_truncates() {
        let span = [10, -10, 20, -30];
        assert_eq!(AggregationStrategy::AverageMagnitude.summarize(&span, false), (17, 0));
    }

    #[test]
    fn test_average_ignores_zeros_when_signed() {
        let span = [0, 0, 30, -6];
        assert_eq!(AggregationStrategy::AverageMagnitude.summarize(&span, true), (30, -6));
    }

    #[test]
    fn test_empty_span() {
        for strategy in [AggregationStrategy::MaxEnvelope, AggregationStrategy::AverageMagnitude] {
            assert_eq!(strategy.summarize(&[], true), (0, 0));
            assert_eq!(strategy.summarize(&[], false), (0, 0));
        }
    }

    #[test]
    fn test_reduce_returns_exact_block_count_with_remainder() {
        let pcm: Vec<i16> = (0..103).collect();
        let blocks = reduce(&pcm, 1, &BlockGeometry::new(10), AggregationStrategy::MaxEnvelope);
        assert_eq!(blocks.len(), 10);
        // span is 10 samples, samples 100..103 are not visited
        assert_eq!(blocks[0].positive, 9);
        assert_eq!(blocks[9].positive, 99);
    }

    #[test]
    fn test_reduce_more_blocks_than_samples() {
        let pcm = [1i16, 2, 3];
        let blocks = reduce(&pcm, 1, &BlockGeometry::new(8), AggregationStrategy::AverageMagnitude);
        assert_eq!(blocks, vec![BlockSummary::default(); 8]);
    }

    #[test]
    fn test_reduce_zero_blocks() {
        let blocks = reduce(&[1, 2, 3], 1, &BlockGeometry::new(0), AggregationStrategy::MaxEnvelope);
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_reduce_ignores_partial_frame() {
        // stereo with a dangling sample: only 2 whole frames are used
        let pcm = [1i16, -2, 3, -4, 30_000];
        let blocks = reduce(&pcm, 2, &BlockGeometry::new(1), AggregationStrategy::MaxEnvelope);
        assert_eq!(blocks, vec![BlockSummary::new(4, 0)]);
    }

    #[test]
    fn test_reduce_applies_scale_and_negative() {
        let pcm = [1000i16, -2000, 500, -500];
        let geometry = BlockGeometry::new(2).with_negative(true).with_scale(0.5);
        let blocks = reduce(&pcm, 1, &geometry, AggregationStrategy::MaxEnvelope);
        assert_eq!(blocks, vec![BlockSummary::new(500, -1000), BlockSummary::new(250, -250)]);
    }

    #[test]
    fn test_negative_zero_when_disabled() {
        let pcm = [-100i16, -200, -300, -400];
        let blocks = reduce(&pcm, 1, &BlockGeometry::new(2), AggregationStrategy::AverageMagnitude);
        assert!(blocks.iter().all(|b| b.negative == 0));
        assert_eq!(blocks[0].positive, 150);
    }

    #[test]
    fn test_full_scale_magnitude_saturates() {
        let pcm = [i16::MIN];
        let blocks = reduce(&pcm, 1, &BlockGeometry::new(1), AggregationStrategy::MaxEnvelope);
        assert_eq!(blocks[0].positive, i16::MAX);
    }

    #[test]
    fn test_preview_block_count() {
        assert_eq!(preview_block_count(0, 2, 50), 0);
        assert_eq!(preview_block_count(10, 1, 50), 1);
        // 100 mono samples -> 2 blocks, divides evenly
        assert_eq!(preview_block_count(100, 1, 50), 2);
        // 150 stereo samples -> 3 blocks over 300 interleaved, divides evenly
        assert_eq!(preview_block_count(150, 2, 50), 3);
        // 88200 mono -> 1764 blocks, divides evenly
        assert_eq!(preview_block_count(88_200, 1, 50), 1764);
        // 101 mono -> 2 blocks, 101 % 2 != 0 -> 3
        assert_eq!(preview_block_count(101, 1, 50), 3);
    }

    #[test]
    fn test_preview_envelope() {
        let pcm = [1i16, -7, 3, 2, -1, 5];
        assert_eq!(preview_envelope(&pcm, 1, 2), vec![7, 5]);
    }

    #[test]
    fn test_display_geometry() {
        // (100 - 2) / (4 + 2) = 16 blocks
        let geometry = BlockGeometry::for_display(100, 200, 4, 2, 10, true);
        assert_eq!(geometry.block_count, 16);
        assert!(geometry.track_negative);
        assert!((geometry.scale - 90.0 / i16::MAX as f32).abs() < 1e-6);

        let bottom = BlockGeometry::for_display(100, 200, 4, 2, 10, false);
        assert!((bottom.scale - 190.0 / i16::MAX as f32).abs() < 1e-6);
    }

    #[test]
    fn test_display_geometry_degenerate() {
        let geometry = BlockGeometry::for_display(0, 0, 0, 0, 5, true);
        assert_eq!(geometry.block_count, 0);
        assert_eq!(geometry.scale, 0.0);
        assert!(geometry.validate().is_ok());
    }

    #[test]
    fn test_geometry_validation() {
        assert!(BlockGeometry::new(4).validate().is_ok());
        assert!(BlockGeometry::new(4).with_scale(f32::NAN).validate().is_err());
        assert!(BlockGeometry::new(4).with_scale(-1.0).validate().is_err());
    }
}
