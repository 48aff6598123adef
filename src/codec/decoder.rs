//! Frame decoder
//!
//! [`decode_frame`] parses one frame from the front of a complete buffer.
//! [`FrameDecoder`] accumulates a TCP byte stream and yields frames as they
//! complete, so a single read may carry part of a header, part of a
//! payload, or several frames back to back.

use bytes::{Buf, BytesMut};

use crate::constants::MAX_FRAME_SAMPLES;
use crate::error::ProtocolError;
use crate::protocol::{Frame, SourceKind, HEADER_SIZE, SAMPLE_SIZE};

/// Parsed frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub source: SourceKind,
    pub metadata: u8,
    pub sample_count: u16,
    pub timestamp: u64,
}

impl FrameHeader {
    /// Parse the 12-byte header at the front of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }

        let mut cursor = &buf[..HEADER_SIZE];
        let source = SourceKind::try_from(cursor.get_u8())?;
        let metadata = cursor.get_u8();
        let sample_count = cursor.get_u16_le();
        let timestamp = cursor.get_u64_le();

        if sample_count as usize > MAX_FRAME_SAMPLES {
            return Err(ProtocolError::FrameTooLarge(sample_count as usize));
        }

        Ok(Self {
            source,
            metadata,
            sample_count,
            timestamp,
        })
    }

    /// Payload bytes that follow this header
    pub fn payload_len(&self) -> usize {
        self.sample_count as usize * SAMPLE_SIZE
    }

    /// Build the frame once the payload has been read
    pub fn into_frame(self, payload: &[u8]) -> Result<Frame, ProtocolError> {
        let needed = self.payload_len();
        if payload.len() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                available: payload.len(),
            });
        }

        let mut cursor = &payload[..needed];
        let mut samples = Vec::with_capacity(self.sample_count as usize);
        while cursor.has_remaining() {
            samples.push(cursor.get_i16_le());
        }

        Frame::from_parts(self.source, self.metadata, self.timestamp, samples)
    }
}

/// Decode one frame from the front of `buf`, returning it with the number
/// of bytes consumed
pub fn decode_frame(buf: &[u8]) -> Result<(Frame, usize), ProtocolError> {
    let header = FrameHeader::decode(buf)?;
    let total = HEADER_SIZE + header.payload_len();
    if buf.len() < total {
        return Err(ProtocolError::Truncated {
            needed: total,
            available: buf.len(),
        });
    }
    let frame = header.into_frame(&buf[HEADER_SIZE..total])?;
    Ok((frame, total))
}

/// Streaming frame decoder
pub struct FrameDecoder {
    buffer: BytesMut,
    /// Header of the frame whose payload is still arriving
    pending: Option<FrameHeader>,
    frames_decoded: u64,
    bytes_consumed: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(HEADER_SIZE + MAX_FRAME_SAMPLES * SAMPLE_SIZE),
            pending: None,
            frames_decoded: 0,
            bytes_consumed: 0,
        }
    }

    /// Feed bytes into the decoder and collect every frame they complete.
    ///
    /// A malformed header is unrecoverable on a byte stream: the buffered
    /// bytes are discarded and the error returned.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Frame>, ProtocolError> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            let header = match self.pending {
                Some(header) => header,
                None => {
                    if self.buffer.len() < HEADER_SIZE {
                        break;
                    }
                    match FrameHeader::decode(&self.buffer) {
                        Ok(header) => {
                            self.buffer.advance(HEADER_SIZE);
                            self.bytes_consumed += HEADER_SIZE as u64;
                            self.pending = Some(header);
                            header
                        }
                        Err(e) => {
                            self.reset();
                            return Err(e);
                        }
                    }
                }
            };

            let needed = header.payload_len();
            if self.buffer.len() < needed {
                break;
            }

            let payload = self.buffer.split_to(needed);
            self.pending = None;
            self.bytes_consumed += needed as u64;
            frames.push(header.into_frame(&payload)?);
            self.frames_decoded += 1;
        }

        Ok(frames)
    }

    /// True when no partial frame is buffered
    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && self.buffer.is_empty()
    }

    /// Drop any partially received frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending = None;
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
