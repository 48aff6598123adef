//! Application configuration
//!
//! Loaded from TOML. Every field has a default, so a partial file (or no
//! file at all) yields the reference configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub audio: AudioConfig,
    pub adc: AdcConfig,
    pub queue: QueueConfig,
    pub delivery: DeliveryConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Listening socket settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub port: u16,
    pub backlog: i32,
    /// How often the acceptor re-checks for a pending client and for shutdown
    pub accept_poll_ms: u64,
    /// Upper bound on a single header or payload write
    pub write_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_TCP_PORT,
            backlog: LISTEN_BACKLOG,
            accept_poll_ms: 50,
            write_timeout_ms: 1000,
        }
    }
}

/// Microphone source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Mono samples per frame; the raw block holds twice as many
    pub capacity: usize,
    /// Bytes per raw sample
    pub sample_width: usize,
    /// Absent means block until the hardware delivers
    pub read_timeout_ms: Option<u64>,
    /// Raw interleaved rate in Hz
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capacity: AUDIO_CAPACITY,
            sample_width: AUDIO_SAMPLE_WIDTH,
            read_timeout_ms: None,
            sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
        }
    }
}

impl AudioConfig {
    /// Bytes requested per hardware read
    pub fn block_bytes(&self) -> usize {
        self.capacity * 2 * self.sample_width
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

/// Analog source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    /// Conversion records per frame
    pub capacity: usize,
    /// Bytes per conversion record
    pub record_size: usize,
    pub read_timeout_ms: u64,
    pub sample_rate: u32,
    /// Channels in the conversion pattern, in scan order
    pub channels: Vec<u8>,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            capacity: ADC_CAPACITY,
            record_size: ADC_RECORD_SIZE,
            read_timeout_ms: DEFAULT_ADC_TIMEOUT_MS,
            sample_rate: DEFAULT_ADC_SAMPLE_RATE,
            channels: vec![2, 3],
        }
    }
}

impl AdcConfig {
    pub fn block_bytes(&self) -> usize {
        self.capacity * self.record_size
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Outbound queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    /// Interval at which a stalled producer re-checks for shutdown
    pub push_poll_ms: u64,
    /// Interval at which an idle consumer re-checks for shutdown
    pub pop_poll_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: QUEUE_CAPACITY,
            push_poll_ms: 100,
            pop_poll_ms: 100,
        }
    }
}

/// Delivery task settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Disconnect once consecutive write failures exceed this count
    pub failure_threshold: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            failure_threshold: FAILURE_THRESHOLD,
        }
    }
}

/// Periodic status logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_DIAGNOSTICS_INTERVAL_MS,
        }
    }
}

impl AppConfig {
    /// Default config file location for this user
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lan-sensor-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the config as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Check per-source capacities against the hardware block layout
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.capacity == 0 || audio.capacity > MAX_FRAME_SAMPLES {
            return Err(Error::Config(format!(
                "audio capacity {} must be in 1..={}",
                audio.capacity, MAX_FRAME_SAMPLES
            )));
        }
        if audio.sample_width != AUDIO_SAMPLE_WIDTH {
            return Err(Error::Config(format!(
                "audio sample width must be {} bytes, got {}",
                AUDIO_SAMPLE_WIDTH, audio.sample_width
            )));
        }

        let adc = &self.adc;
        if adc.capacity == 0 || adc.capacity > MAX_FRAME_SAMPLES {
            return Err(Error::Config(format!(
                "adc capacity {} must be in 1..={}",
                adc.capacity, MAX_FRAME_SAMPLES
            )));
        }
        if adc.record_size < ADC_RECORD_SIZE {
            return Err(Error::Config(format!(
                "adc record size {} is smaller than {} bytes",
                adc.record_size, ADC_RECORD_SIZE
            )));
        }
        if adc.channels.is_empty() {
            return Err(Error::Config("adc channel pattern is empty".into()));
        }
        if let Some(channel) = adc.channels.iter().find(|&&c| c > 0xF) {
            return Err(Error::Config(format!("adc channel {} does not fit in 4 bits", channel)));
        }

        if self.queue.capacity == 0 {
            return Err(Error::Config("queue capacity must be non-zero".into()));
        }
        if self.delivery.failure_threshold == 0 {
            return Err(Error::Config("failure threshold must be non-zero".into()));
        }
        if self.network.backlog < 1 {
            return Err(Error::Config("listen backlog must be at least 1".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.network.bind_address, self.network.port)
    }
}
