//! # Waveform Demo
//!
//! Decodes an audio file and prints its waveform as a strip of bars with a
//! simulated playback position.
//!
//! Run with:
//! ```bash
//! cargo run --example waveform_demo -p core-waveform -- /path/to/track.mp3
//!
//! # 80 blocks, playhead at 30%, JSON logs
//! cargo run --example waveform_demo -p core-waveform -- /path/to/track.flac 80 0.3 json
//! ```

use anyhow::{bail, Context};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use core_waveform::progress::{block_index, block_state, BlockState};
use core_waveform::reducer::AggregationStrategy;
use core_waveform::{AudioSource, BlockGeometry, DecodeConfig, WaveformService};
use std::env;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

const BAR_HEIGHT: u32 = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        bail!("usage: waveform_demo <audio file> [blocks] [progress] [pretty|json|compact]");
    };
    let blocks: u32 = match args.get(2) {
        Some(value) => value.parse().context("blocks must be a positive integer")?,
        None => 60,
    };
    let progress: f32 = match args.get(3) {
        Some(value) => value.parse().context("progress must be a number in [0, 1]")?,
        None => 0.4,
    };
    let format = match args.get(4).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::default(),
    };

    init_logging(
        LoggingConfig::default()
            .with_format(format)
            .with_level(LogLevel::Info),
    )?;

    let service = WaveformService::with_symphonia(DecodeConfig::default())?;

    let started = Instant::now();
    let descriptor = service
        .decode(AudioSource::file(path), CancellationToken::new())
        .await?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "Decode finished");

    println!(
        "{}  {} Hz  {} ch  {:.2} s  ~{} kbps  {} frames",
        descriptor.codec(),
        descriptor.sample_rate(),
        descriptor.channels(),
        descriptor.duration_us() as f64 / 1_000_000.0,
        descriptor.average_bit_rate(),
        descriptor.samples_decoded(),
    );

    // One character per block: a 1-wide bar with no margin.
    let geometry = BlockGeometry::for_display(blocks, BAR_HEIGHT, 1, 0, 0, false);
    let summaries =
        WaveformService::reduce(descriptor, geometry, AggregationStrategy::MaxEnvelope).await?;

    let current = block_index(progress, summaries.len());
    for row in (1..=BAR_HEIGHT as i16).rev() {
        let line: String = summaries
            .iter()
            .enumerate()
            .map(|(i, block)| match (block.positive >= row, block_state(i, current)) {
                (true, BlockState::Played) => '#',
                (true, BlockState::Unplayed) => '|',
                (false, _) => ' ',
            })
            .collect();
        println!("{}", line);
    }
    println!("{}^", " ".repeat(current.min(summaries.len())));

    Ok(())
}
