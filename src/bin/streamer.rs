//! Sensor Streamer
//!
//! Samples the microphone and ADC (simulated on hosts without the
//! peripherals) and serves the frame stream to one TCP client.
//!
//! Usage: `streamer [CONFIG_PATH]` or `streamer --init-config [PATH]`

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_sensor_streamer::{
    config::AppConfig,
    pipeline::Streamer,
    sources::{SimulatedAdc, SimulatedMicrophone},
};

/// Tone played by the simulated microphone
const SIMULATED_TONE_HZ: f32 = 440.0;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let first = args.next();

    if first.as_deref() == Some("--init-config") {
        let path = args
            .next()
            .map(PathBuf::from)
            .or_else(AppConfig::default_path)
            .context("no config path given and no default location available")?;
        AppConfig::default().save(&path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    tracing::info!("Starting Sensor Streamer");

    let config_path = first.map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    config.validate()?;

    tracing::info!(
        "Audio: {} samples/frame at {} Hz raw; ADC: {} samples/frame at {} Hz on channels {:?}",
        config.audio.capacity,
        config.audio.sample_rate,
        config.adc.capacity,
        config.adc.sample_rate,
        config.adc.channels
    );

    let microphone = SimulatedMicrophone::new(config.audio.sample_rate, SIMULATED_TONE_HZ);
    let adc = SimulatedAdc::new(config.adc.channels.clone(), config.adc.sample_rate, config.adc.record_size);

    let streamer = Streamer::start(&config, microphone, adc)
        .with_context(|| format!("failed to start streamer on {}", config.bind_addr()))?;

    println!("\nStreaming on {} - press Ctrl+C to stop\n", streamer.local_addr());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    tokio::task::spawn_blocking(move || streamer.stop()).await?;
    Ok(())
}
