//! Sensor Receiver
//!
//! Connects to a streamer, decodes frames and logs per-source counts,
//! per-channel ADC counts and throughput.
//!
//! Usage: `receiver [HOST:PORT]` (default `127.0.0.1:5000`)

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_sensor_streamer::{
    constants::DEFAULT_TCP_PORT,
    network::{client::DEFAULT_READ_TIMEOUT, demux_adc, FrameReader, ThroughputMeter},
    protocol::{Frame, SourceKind},
};

#[derive(Default)]
struct Tally {
    audio_frames: u64,
    adc_frames: u64,
    adc_channels: BTreeMap<u8, u64>,
}

impl Tally {
    fn record(&mut self, frame: &Frame) {
        match frame.source() {
            SourceKind::Audio => self.audio_frames += 1,
            SourceKind::Adc => {
                self.adc_frames += 1;
                for (channel, samples) in demux_adc(frame) {
                    *self.adc_channels.entry(channel).or_default() += samples.len() as u64;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_TCP_PORT));

    tracing::info!("Connecting to {}", addr);
    let mut reader = FrameReader::connect(&addr, Some(DEFAULT_READ_TIMEOUT))
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    tracing::info!("Connected, waiting for frames (Ctrl+C to stop)");

    let mut tally = Tally::default();
    let mut meter = ThroughputMeter::new();

    loop {
        let frame = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            frame = reader.read_frame() => frame,
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!("Streamer closed the connection");
                break;
            }
            Err(e) => {
                tracing::error!("Receive failed: {}", e);
                break;
            }
        };

        tally.record(&frame);
        if let Some(rate) = meter.record(frame.wire_len() as u64) {
            tracing::info!(
                "{:.1} KB/s | audio {} frames | adc {} frames {:?}",
                rate / 1024.0,
                tally.audio_frames,
                tally.adc_frames,
                tally.adc_channels
            );
        }
    }

    tracing::info!(
        "Received {} frames ({:.1} KB): audio {}, adc {}",
        reader.frames_received(),
        reader.bytes_received() as f64 / 1024.0,
        tally.audio_frames,
        tally.adc_frames
    );
    Ok(())
}
