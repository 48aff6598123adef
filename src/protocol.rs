//! Frame data model shared by the sources, the queue and delivery
//!
//! Wire layout of one frame (little-endian throughout):
//!
//! ```text
//! ┌────────┬──────────┬──────────────┬──────────────────┬──────────────────────┐
//! │ source │ metadata │ sample_count │ timestamp (µs)   │ payload              │
//! │  u8    │   u8     │    u16       │      u64         │ sample_count × i16   │
//! └────────┴──────────┴──────────────┴──────────────────┴──────────────────────┘
//!  ◀──────────────────── header, 12 bytes ─────────────▶
//! ```

use std::fmt;

use crate::constants::MAX_FRAME_SAMPLES;
use crate::error::ProtocolError;

/// Size of the fixed frame header in bytes
pub const HEADER_SIZE: usize = 12;

/// Size of one payload sample in bytes
pub const SAMPLE_SIZE: usize = 2;

/// Which hardware source produced a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum SourceKind {
    Audio = 0,
    Adc = 1,
}

impl SourceKind {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for SourceKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SourceKind::Audio),
            1 => Ok(SourceKind::Adc),
            other => Err(ProtocolError::UnknownSource(other)),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Audio => f.write_str("audio"),
            SourceKind::Adc => f.write_str("adc"),
        }
    }
}

/// One timestamped block of samples from a single source.
///
/// Fields are private so that `source` and `sample_count` cannot drift
/// from the payload once the frame exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    source: SourceKind,
    metadata: u8,
    timestamp: u64,
    samples: Vec<i16>,
}

impl Frame {
    /// Build a frame with reserved metadata set to zero
    pub fn new(source: SourceKind, timestamp: u64, samples: Vec<i16>) -> Result<Self, ProtocolError> {
        Self::from_parts(source, 0, timestamp, samples)
    }

    /// Build a frame carrying an explicit metadata byte
    pub fn from_parts(
        source: SourceKind,
        metadata: u8,
        timestamp: u64,
        samples: Vec<i16>,
    ) -> Result<Self, ProtocolError> {
        if samples.len() > MAX_FRAME_SAMPLES {
            return Err(ProtocolError::FrameTooLarge(samples.len()));
        }
        Ok(Self {
            source,
            metadata,
            timestamp,
            samples,
        })
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn metadata(&self) -> u8 {
        self.metadata
    }

    /// Number of valid samples; always fits in 16 bits
    pub fn sample_count(&self) -> u16 {
        self.samples.len() as u16
    }

    /// Production time in microseconds on the process monotonic clock
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Payload length on the wire in bytes
    pub fn payload_len(&self) -> usize {
        self.samples.len() * SAMPLE_SIZE
    }

    /// Total bytes this frame occupies on the wire
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }
}

/// Pack an ADC channel and 12-bit magnitude into one sample:
/// channel in bits 12..=15, magnitude in bits 0..=11.
pub fn pack_adc_sample(channel: u8, data: u16) -> i16 {
    ((((channel as u16) & 0xF) << 12) | (data & 0x0FFF)) as i16
}

/// Inverse of [`pack_adc_sample`]: `(channel, data)`
pub fn unpack_adc_sample(sample: i16) -> (u8, u16) {
    let raw = sample as u16;
    (((raw >> 12) & 0xF) as u8, raw & 0x0FFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_byte_mapping() {
        assert_eq!(SourceKind::Audio.as_byte(), 0);
        assert_eq!(SourceKind::Adc.as_byte(), 1);
        assert_eq!(SourceKind::try_from(1), Ok(SourceKind::Adc));
        assert_eq!(SourceKind::try_from(7), Err(ProtocolError::UnknownSource(7)));
    }

    #[test]
    fn test_frame_rejects_oversize_payload() {
        let result = Frame::new(SourceKind::Audio, 0, vec![0; MAX_FRAME_SAMPLES + 1]);
        assert_eq!(result, Err(ProtocolError::FrameTooLarge(MAX_FRAME_SAMPLES + 1)));

        let frame = Frame::new(SourceKind::Audio, 0, vec![0; MAX_FRAME_SAMPLES]).unwrap();
        assert_eq!(frame.sample_count(), 256);
        assert_eq!(frame.metadata(), 0);
        assert_eq!(frame.wire_len(), HEADER_SIZE + 512);
    }

    #[test]
    fn test_adc_packing() {
        assert_eq!(pack_adc_sample(2, 0xABC) as u16, 0x2ABC);
        assert_eq!(unpack_adc_sample(0x2ABC), (2, 0xABC));

        // Out-of-range inputs are masked, not carried into the other field
        assert_eq!(pack_adc_sample(0x13, 0xF123) as u16, 0x3123);
        assert_eq!(unpack_adc_sample(pack_adc_sample(15, 0xFFF)), (15, 0xFFF));
    }
}
