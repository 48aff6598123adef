//! Microphone source
//!
//! The microphone delivers interleaved two-slot 16-bit samples. Only the
//! odd slot carries the microphone; the even slot is skipped, so a block
//! of `2 * capacity` raw samples becomes one mono frame of `capacity`.

use std::time::{Duration, Instant};

use crate::config::AudioConfig;
use crate::constants::AUDIO_SAMPLE_WIDTH;
use crate::network::connection::SharedConnection;
use crate::pipeline::queue::SharedQueue;
use crate::protocol::SourceKind;
use crate::sources::capability::SampleCapability;
use crate::sources::task::{BlockDecoder, SamplingTask};

/// Audio sampling task
pub type AudioSource<C> = SamplingTask<C, AudioDecoder>;

/// Keep every odd-indexed raw sample: `out[j] = raw[2j + 1]`
pub fn skip_even_slots(raw: &[i16]) -> Vec<i16> {
    raw.chunks_exact(2).map(|pair| pair[1]).collect()
}

/// Converts raw interleaved blocks of 16-bit samples to mono samples
#[derive(Debug, Clone)]
pub struct AudioDecoder {
    capacity: usize,
}

impl AudioDecoder {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// `sample_width` is checked by `AppConfig::validate`; raw samples
    /// are always 16-bit here
    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(config.capacity)
    }
}

impl BlockDecoder for AudioDecoder {
    const SOURCE: SourceKind = SourceKind::Audio;

    fn block_bytes(&self) -> usize {
        self.capacity * 2 * AUDIO_SAMPLE_WIDTH
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn sample_count(&self, bytes_read: usize) -> usize {
        (bytes_read / AUDIO_SAMPLE_WIDTH) / 2
    }

    fn decode(&self, block: &[u8], count: usize) -> Vec<i16> {
        let raw: Vec<i16> = block[..2 * count * AUDIO_SAMPLE_WIDTH]
            .chunks_exact(AUDIO_SAMPLE_WIDTH)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        skip_even_slots(&raw)
    }
}

impl<C: SampleCapability> SamplingTask<C, AudioDecoder> {
    /// Build the audio task from its config section
    pub fn audio(
        capability: C,
        config: &AudioConfig,
        queue: SharedQueue,
        connection: SharedConnection,
        epoch: Instant,
    ) -> Self {
        SamplingTask::new(capability, AudioDecoder::from_config(config), queue, connection, epoch)
            .with_read_timeout(config.read_timeout())
    }
}

/// Raw block duration at `sample_rate` interleaved samples per second
pub fn block_duration(raw_samples: usize, sample_rate: u32) -> Duration {
    Duration::from_micros(raw_samples as u64 * 1_000_000 / sample_rate.max(1) as u64)
}
