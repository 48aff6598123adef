//! Frame encoder
//!
//! Produces the 12-byte header and the little-endian payload as two
//! separate buffers, matching the two ordered writes delivery performs.

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::{Frame, HEADER_SIZE, SAMPLE_SIZE};

/// Encode the fixed header of a frame
pub fn encode_header(frame: &Frame) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0] = frame.source().as_byte();
    header[1] = frame.metadata();
    header[2..4].copy_from_slice(&frame.sample_count().to_le_bytes());
    header[4..12].copy_from_slice(&frame.timestamp().to_le_bytes());
    header
}

/// Encode the payload of a frame (`sample_count * 2` bytes, no terminator)
pub fn encode_payload(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(frame.payload_len());
    put_samples(&mut buf, frame.samples());
    buf.freeze()
}

/// Header followed by payload in one contiguous buffer
pub fn encode_frame(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(frame.wire_len());
    buf.put_slice(&encode_header(frame));
    put_samples(&mut buf, frame.samples());
    buf.freeze()
}

fn put_samples(buf: &mut BytesMut, samples: &[i16]) {
    for &sample in samples {
        buf.put_i16_le(sample);
    }
}

/// Header and payload ready to be written in order
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub header: [u8; HEADER_SIZE],
    pub payload: Bytes,
}

impl EncodedFrame {
    /// Bytes written for both parts together
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encoder with a reusable payload buffer and running statistics
pub struct FrameEncoder {
    /// Encoding buffer (reused to avoid allocations)
    buffer: BytesMut,
    /// Frame counter for statistics
    frames_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(crate::constants::MAX_FRAME_SAMPLES * SAMPLE_SIZE),
            frames_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Encode a frame into its header and payload parts
    pub fn encode(&mut self, frame: &Frame) -> EncodedFrame {
        self.buffer.reserve(frame.payload_len());
        put_samples(&mut self.buffer, frame.samples());
        let payload = self.buffer.split().freeze();

        let encoded = EncodedFrame {
            header: encode_header(frame),
            payload,
        };

        self.frames_encoded += 1;
        self.bytes_produced += encoded.wire_len() as u64;
        encoded
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
        }
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encoder statistics
#[derive(Debug, Clone, Default)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
}
