//! # Progress Mapping
//!
//! Maps a playback-progress fraction onto the block grid so a renderer can
//! paint blocks `0..index` as played and the rest as unplayed.

/// Whether a block lies before or after the playhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Played,
    Unplayed,
}

/// Index of the block under the playhead: `floor(progress * block_count)`.
///
/// `progress` is expected in `[0.0, 1.0]`. A result equal to `block_count`
/// means the playhead is past the last block (everything played). Negative or
/// NaN progress maps to 0.
pub fn block_index(progress: f32, block_count: usize) -> usize {
    (f64::from(progress) * block_count as f64).floor() as usize
}

/// Classify a single block against the playhead index.
pub fn block_state(block: usize, current_index: usize) -> BlockState {
    if block < current_index {
        BlockState::Played
    } else {
        BlockState::Unplayed
    }
}

/// Number of fully played blocks for a progress fraction, capped at
/// `block_count`.
pub fn played_blocks(progress: f32, block_count: usize) -> usize {
    block_index(progress, block_count).min(block_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_index() {
        assert_eq!(block_index(0.5, 10), 5);
        assert_eq!(block_index(0.99, 10), 9);
        assert_eq!(block_index(0.0, 10), 0);
        assert_eq!(block_index(1.0, 10), 10);
    }

    #[test]
    fn test_block_index_out_of_domain() {
        assert_eq!(block_index(-0.3, 10), 0);
        assert_eq!(block_index(f32::NAN, 10), 0);
        assert_eq!(block_index(0.7, 0), 0);
    }

    #[test]
    fn test_block_index_exact_past_f32_precision() {
        let count = (1usize << 24) + 1;
        assert_eq!(block_index(1.0, count), count);
        assert_eq!(block_index(0.5, 2 * count), count);
        assert_eq!(played_blocks(1.0, count), count);
    }

    #[test]
    fn test_block_state() {
        let current = block_index(0.5, 10);
        assert_eq!(block_state(4, current), BlockState::Played);
        assert_eq!(block_state(5, current), BlockState::Unplayed);
        assert_eq!(block_state(9, current), BlockState::Unplayed);
    }

    #[test]
    fn test_played_blocks_capped() {
        assert_eq!(played_blocks(1.0, 10), 10);
        assert_eq!(played_blocks(1.5, 10), 10);
        assert_eq!(played_blocks(0.25, 8), 2);
    }
}
