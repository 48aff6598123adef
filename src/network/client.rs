//! Receiving side of the stream
//!
//! Reads the 12-byte header fully, then exactly `sample_count * 2`
//! payload bytes, so frame boundaries never depend on how TCP segments
//! the stream.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;

use crate::codec::decoder::FrameHeader;
use crate::error::{Error, NetworkError, Result};
use crate::protocol::{unpack_adc_sample, Frame, SourceKind, HEADER_SIZE};

/// Per-read timeout used by the desktop receiver
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Async frame reader over any byte stream
pub struct FrameReader<R> {
    reader: R,
    read_timeout: Option<Duration>,
    bytes_received: u64,
    frames_received: u64,
}

impl FrameReader<TcpStream> {
    /// Connect to a streamer
    pub async fn connect(addr: &str, read_timeout: Option<Duration>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, read_timeout))
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, read_timeout: Option<Duration>) -> Self {
        Self {
            reader,
            read_timeout,
            bytes_received: 0,
            frames_received: 0,
        }
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Read the next frame. `Ok(None)` on a clean close between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut header = [0u8; HEADER_SIZE];
        let got = self.fill(&mut header).await?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            return Err(NetworkError::ConnectionClosed.into());
        }

        let header = FrameHeader::decode(&header)?;
        let mut payload = vec![0u8; header.payload_len()];
        if self.fill(&mut payload).await? < payload.len() {
            return Err(NetworkError::ConnectionClosed.into());
        }

        let frame = header.into_frame(&payload)?;
        self.bytes_received += (HEADER_SIZE + payload.len()) as u64;
        self.frames_received += 1;
        Ok(Some(frame))
    }

    /// Read until `buf` is full or the peer closes; returns bytes read
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.reader.read(&mut buf[filled..]);
            let n = match self.read_timeout {
                Some(limit) => tokio::time::timeout(limit, read)
                    .await
                    .map_err(|_| Error::Network(NetworkError::Timeout))??,
                None => read.await?,
            };
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// Split packed ADC samples into per-channel 12-bit magnitudes.
/// Audio frames yield an empty map.
pub fn demux_adc(frame: &Frame) -> BTreeMap<u8, Vec<u16>> {
    let mut channels: BTreeMap<u8, Vec<u16>> = BTreeMap::new();
    if frame.source() != SourceKind::Adc {
        return channels;
    }
    for &sample in frame.samples() {
        let (channel, data) = unpack_adc_sample(sample);
        channels.entry(channel).or_default().push(data);
    }
    channels
}

/// Bytes-per-second over roughly one-second windows
pub struct ThroughputMeter {
    window: Duration,
    window_start: Instant,
    bytes: u64,
}

impl ThroughputMeter {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            window_start: Instant::now(),
            bytes: 0,
        }
    }

    /// Add `bytes`; returns the rate once a full window has elapsed
    pub fn record(&mut self, bytes: u64) -> Option<f64> {
        self.record_at(bytes, Instant::now())
    }

    fn record_at(&mut self, bytes: u64, now: Instant) -> Option<f64> {
        self.bytes += bytes;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }
        let rate = self.bytes as f64 / elapsed.as_secs_f64();
        self.window_start = now;
        self.bytes = 0;
        Some(rate)
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}
