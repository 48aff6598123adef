//! Dual-channel ADC source
//!
//! The ADC continuously converts a fixed channel pattern and delivers
//! packed conversion records. Each record becomes one sample carrying
//! its channel in the top nibble and the 12-bit magnitude below it.
//!
//! Conversion record layout (little-endian `u32`, first four bytes of
//! each record):
//!
//! ```text
//!  31            18  17  16      13  12  11                 0
//! ┌────────────────┬────┬──────────┬────┬────────────────────┐
//! │    reserved    │unit│ channel  │ r  │        data        │
//! └────────────────┴────┴──────────┴────┴────────────────────┘
//! ```

use std::time::Instant;

use crate::config::AdcConfig;
use crate::constants::ADC_RECORD_SIZE;
use crate::error::SourceError;
use crate::network::connection::SharedConnection;
use crate::pipeline::queue::SharedQueue;
use crate::protocol::{pack_adc_sample, SourceKind};
use crate::sources::capability::SampleCapability;
use crate::sources::task::{BlockDecoder, SamplingTask};

/// ADC sampling task
pub type AdcSource<C> = SamplingTask<C, AdcDecoder>;

const DATA_MASK: u32 = 0x0FFF;
const CHANNEL_SHIFT: u32 = 13;
const CHANNEL_MASK: u32 = 0xF;
const UNIT_SHIFT: u32 = 17;

/// One decoded conversion result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcRecord {
    /// Channel index, 0..=15
    pub channel: u8,
    /// Conversion magnitude, 0..=4095
    pub data: u16,
    /// ADC unit that performed the conversion
    pub unit: u8,
}

impl AdcRecord {
    /// Decode the first four bytes of a record
    pub fn decode(bytes: [u8; 4]) -> Self {
        let word = u32::from_le_bytes(bytes);
        Self {
            channel: ((word >> CHANNEL_SHIFT) & CHANNEL_MASK) as u8,
            data: (word & DATA_MASK) as u16,
            unit: ((word >> UNIT_SHIFT) & 0x1) as u8,
        }
    }

    /// Encode into the hardware record layout
    pub fn encode(&self) -> [u8; 4] {
        let word = (self.data as u32 & DATA_MASK)
            | ((self.channel as u32 & CHANNEL_MASK) << CHANNEL_SHIFT)
            | ((self.unit as u32 & 0x1) << UNIT_SHIFT);
        word.to_le_bytes()
    }

    /// Wire sample: `(channel & 0xF) << 12 | (data & 0xFFF)`
    pub fn to_sample(&self) -> i16 {
        pack_adc_sample(self.channel, self.data)
    }
}

/// Converts blocks of conversion records to packed samples
#[derive(Debug, Clone)]
pub struct AdcDecoder {
    capacity: usize,
    record_size: usize,
}

impl AdcDecoder {
    /// Records shorter than one conversion word cannot be decoded
    pub fn new(capacity: usize, record_size: usize) -> Result<Self, SourceError> {
        if record_size < ADC_RECORD_SIZE {
            return Err(SourceError::InvalidRecordSize(record_size));
        }
        Ok(Self {
            capacity,
            record_size,
        })
    }

    pub fn from_config(config: &AdcConfig) -> Result<Self, SourceError> {
        Self::new(config.capacity, config.record_size)
    }
}

impl BlockDecoder for AdcDecoder {
    const SOURCE: SourceKind = SourceKind::Adc;

    fn block_bytes(&self) -> usize {
        self.capacity * self.record_size
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn sample_count(&self, bytes_read: usize) -> usize {
        bytes_read / self.record_size
    }

    fn decode(&self, block: &[u8], count: usize) -> Vec<i16> {
        block
            .chunks_exact(self.record_size)
            .take(count)
            .map(|record| {
                AdcRecord::decode([record[0], record[1], record[2], record[3]]).to_sample()
            })
            .collect()
    }
}

impl<C: SampleCapability> SamplingTask<C, AdcDecoder> {
    /// Build the ADC task from its config section
    pub fn adc(
        capability: C,
        config: &AdcConfig,
        queue: SharedQueue,
        connection: SharedConnection,
        epoch: Instant,
    ) -> Result<Self, SourceError> {
        let decoder = AdcDecoder::from_config(config)?;
        Ok(SamplingTask::new(capability, decoder, queue, connection, epoch)
            .with_read_timeout(Some(config.read_timeout())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use crate::network::connection::tests::MemoryStream;
    use crate::network::connection::{Client, ConnectionState};
    use crate::pipeline::queue::create_shared_queue;
    use crate::shutdown::Shutdown;
    use crate::sources::simulated::ScriptedCapability;
    use crate::sources::task::BlockOutcome;
    use std::sync::Arc;

    fn record_bytes(records: &[(u8, u16)]) -> Vec<u8> {
        records
            .iter()
            .flat_map(|&(channel, data)| AdcRecord { channel, data, unit: 0 }.encode())
            .collect()
    }

    #[test]
    fn test_record_layout() {
        // channel 2, data 0xABC, unit 1
        let word: u32 = 0xABC | (2 << 13) | (1 << 17);
        let record = AdcRecord::decode(word.to_le_bytes());
        assert_eq!(record, AdcRecord { channel: 2, data: 0xABC, unit: 1 });
        assert_eq!(record.encode(), word.to_le_bytes());
        assert_eq!(record.to_sample() as u16, 0x2ABC);
    }

    #[test]
    fn test_reserved_bits_ignored() {
        let word: u32 = 0xFFFC_0000 | (1 << 12) | (3 << 13) | 0x123;
        let record = AdcRecord::decode(word.to_le_bytes());
        assert_eq!(record.channel, 3);
        assert_eq!(record.data, 0x123);
    }

    #[test]
    fn test_block_to_frame() {
        let mut capability = ScriptedCapability::new("adc");
        capability.push_block(record_bytes(&[(2, 0xABC), (3, 0x001), (2, 0xFFF)]));

        let queue = create_shared_queue(4);
        let connection = Arc::new(ConnectionState::new());
        connection.connect(Client::new(MemoryStream::new("test"))).unwrap();
        let mut source = AdcSource::adc(capability, &AdcConfig::default(), queue.clone(), connection, Instant::now()).unwrap();

        assert_eq!(source.step(&Shutdown::new()), BlockOutcome::Enqueued);
        let frame = queue.pop().unwrap();
        assert_eq!(frame.source(), SourceKind::Adc);
        assert_eq!(frame.sample_count(), 3);
        let raw: Vec<u16> = frame.samples().iter().map(|&s| s as u16).collect();
        assert_eq!(raw, vec![0x2ABC, 0x3001, 0x2FFF]);
    }

    #[test]
    fn test_timeout_is_not_an_error() {
        let mut capability = ScriptedCapability::new("adc");
        capability.push_error(CaptureError::Timeout);
        capability.push_block(Vec::new());
        capability.push_error(CaptureError::Hardware("dma overrun".into()));

        let queue = create_shared_queue(4);
        let connection = Arc::new(ConnectionState::new());
        let mut source = AdcSource::adc(capability, &AdcConfig::default(), queue, connection, Instant::now()).unwrap();
        let shutdown = Shutdown::new();

        assert_eq!(source.step(&shutdown), BlockOutcome::NoData);
        assert_eq!(source.step(&shutdown), BlockOutcome::NoData);
        assert_eq!(source.step(&shutdown), BlockOutcome::ReadFailed);
        assert_eq!(source.stats().snapshot().read_errors, 1);
    }

    #[test]
    fn test_short_record_size_refused() {
        assert!(matches!(AdcDecoder::new(256, 3), Err(SourceError::InvalidRecordSize(3))));
        assert!(matches!(AdcDecoder::new(256, 0), Err(SourceError::InvalidRecordSize(0))));

        let config = AdcConfig {
            record_size: 2,
            ..AdcConfig::default()
        };
        let result = AdcSource::adc(
            ScriptedCapability::new("adc"),
            &config,
            create_shared_queue(4),
            Arc::new(ConnectionState::new()),
            Instant::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_wide_records_use_leading_word() {
        let decoder = AdcDecoder::new(2, 8).unwrap();
        let mut block = vec![0xEEu8; 16];
        block[..4].copy_from_slice(&AdcRecord { channel: 2, data: 5, unit: 0 }.encode());
        block[8..12].copy_from_slice(&AdcRecord { channel: 3, data: 6, unit: 0 }.encode());
        assert_eq!(decoder.sample_count(16), 2);
        assert_eq!(decoder.decode(&block, 2), vec![pack_adc_sample(2, 5), pack_adc_sample(3, 6)]);
    }

    #[test]
    fn test_oversize_block_rejected() {
        let mut capability = ScriptedCapability::new("adc");
        capability.push_misreport(257 * 4);

        let queue = create_shared_queue(4);
        let connection = Arc::new(ConnectionState::new());
        connection.connect(Client::new(MemoryStream::new("test"))).unwrap();
        let mut source = AdcSource::adc(capability, &AdcConfig::default(), queue.clone(), connection, Instant::now()).unwrap();

        assert_eq!(source.step(&Shutdown::new()), BlockOutcome::Rejected);
        assert!(queue.is_empty());
    }
}
