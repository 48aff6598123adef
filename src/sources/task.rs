//! Generic sampling loop shared by both sources
//!
//! read block → check capacity → gate on connection → build frame → push.
//! Each step runs on the task's own thread; the only suspension points
//! are the capability read and the queue push.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{CaptureError, SourceError};
use crate::network::connection::SharedConnection;
use crate::pipeline::queue::SharedQueue;
use crate::protocol::{Frame, SourceKind};
use crate::shutdown::Shutdown;
use crate::sources::capability::SampleCapability;

/// Source-specific conversion from raw hardware bytes to samples
pub trait BlockDecoder: Send {
    /// Source tag carried by every frame this decoder feeds
    const SOURCE: SourceKind;

    /// Bytes requested per hardware read
    fn block_bytes(&self) -> usize;

    /// Maximum samples per frame
    fn capacity(&self) -> usize;

    /// Samples a read of `bytes_read` bytes would produce
    fn sample_count(&self, bytes_read: usize) -> usize;

    /// Convert `count` samples from the front of `block`.
    /// Callers guarantee `count <= capacity()`.
    fn decode(&self, block: &[u8], count: usize) -> Vec<i16>;
}

/// What one pass through the loop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// A frame went into the outbound queue
    Enqueued,
    /// The read timed out without data
    NoData,
    /// No client attached; block discarded before framing
    DroppedDisconnected,
    /// Decoded count exceeded capacity; block discarded
    Rejected,
    /// The capability reported a fault
    ReadFailed,
    /// Shutdown arrived while waiting for queue space
    Interrupted,
}

/// Per-source counters
#[derive(Debug, Default)]
pub struct SourceStats {
    blocks_read: AtomicU64,
    frames_enqueued: AtomicU64,
    dropped_disconnected: AtomicU64,
    rejected: AtomicU64,
    read_errors: AtomicU64,
}

impl SourceStats {
    pub fn snapshot(&self) -> SourceStatsSnapshot {
        SourceStatsSnapshot {
            blocks_read: self.blocks_read.load(Ordering::Relaxed),
            frames_enqueued: self.frames_enqueued.load(Ordering::Relaxed),
            dropped_disconnected: self.dropped_disconnected.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStatsSnapshot {
    pub blocks_read: u64,
    pub frames_enqueued: u64,
    pub dropped_disconnected: u64,
    pub rejected: u64,
    pub read_errors: u64,
}

/// One sampling task: a capability, a decoder and the pipeline handles
pub struct SamplingTask<C, D> {
    capability: C,
    decoder: D,
    queue: SharedQueue,
    connection: SharedConnection,
    read_timeout: Option<Duration>,
    push_poll: Duration,
    /// Zero point of the frame timestamp clock
    epoch: Instant,
    buffer: Vec<u8>,
    stats: Arc<SourceStats>,
}

impl<C: SampleCapability, D: BlockDecoder> SamplingTask<C, D> {
    pub fn new(
        capability: C,
        decoder: D,
        queue: SharedQueue,
        connection: SharedConnection,
        epoch: Instant,
    ) -> Self {
        let buffer = vec![0u8; decoder.block_bytes()];
        Self {
            capability,
            decoder,
            queue,
            connection,
            read_timeout: None,
            push_poll: Duration::from_millis(100),
            epoch,
            buffer,
            stats: Arc::new(SourceStats::default()),
        }
    }

    /// Bound each hardware read; `None` blocks until data arrives
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Interval at which a push stalled on a full queue re-checks shutdown
    pub fn with_push_poll(mut self, poll: Duration) -> Self {
        self.push_poll = poll;
        self
    }

    pub fn source(&self) -> SourceKind {
        D::SOURCE
    }

    pub fn stats(&self) -> Arc<SourceStats> {
        self.stats.clone()
    }

    /// Convert a raw block into a frame stamped with the current time
    pub fn build_frame(&self, block: &[u8], bytes_read: usize) -> Result<Frame, SourceError> {
        let count = self.checked_count(bytes_read)?;
        let samples = self.decoder.decode(block, count);
        let timestamp = self.epoch.elapsed().as_micros() as u64;
        Frame::new(D::SOURCE, timestamp, samples).map_err(|_| SourceError::CapacityExceeded {
            count,
            capacity: self.decoder.capacity(),
        })
    }

    fn checked_count(&self, bytes_read: usize) -> Result<usize, SourceError> {
        let count = self.decoder.sample_count(bytes_read);
        let capacity = self.decoder.capacity();
        if count > capacity || bytes_read > self.buffer.len() {
            return Err(SourceError::CapacityExceeded { count, capacity });
        }
        Ok(count)
    }

    /// Read one block and route it
    pub fn step(&mut self, shutdown: &Shutdown) -> BlockOutcome {
        let bytes_read = match self.capability.read(&mut self.buffer, self.read_timeout) {
            Ok(0) | Err(CaptureError::Timeout) => return BlockOutcome::NoData,
            Ok(n) => n,
            Err(e) => {
                self.stats.read_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("{} read from {} failed: {}", D::SOURCE, self.capability.name(), e);
                return BlockOutcome::ReadFailed;
            }
        };
        self.stats.blocks_read.fetch_add(1, Ordering::Relaxed);
        self.handle_block(bytes_read, shutdown)
    }

    fn handle_block(&mut self, bytes_read: usize, shutdown: &Shutdown) -> BlockOutcome {
        if let Err(e) = self.checked_count(bytes_read) {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::error!("{} block dropped ({} bytes): {}", D::SOURCE, bytes_read, e);
            return BlockOutcome::Rejected;
        }

        if !self.connection.is_connected() {
            self.stats.dropped_disconnected.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("{} block dropped, no client", D::SOURCE);
            return BlockOutcome::DroppedDisconnected;
        }

        let frame = match self.build_frame(&self.buffer, bytes_read) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::error!("{} block dropped: {}", D::SOURCE, e);
                return BlockOutcome::Rejected;
            }
        };

        if self.queue.push_until(frame, shutdown, self.push_poll) {
            self.stats.frames_enqueued.fetch_add(1, Ordering::Relaxed);
            BlockOutcome::Enqueued
        } else {
            BlockOutcome::Interrupted
        }
    }

    /// Loop until shutdown
    pub fn run(mut self, shutdown: Shutdown) {
        tracing::info!(
            "{} source started on {} ({} bytes/block, capacity {})",
            D::SOURCE,
            self.capability.name(),
            self.decoder.block_bytes(),
            self.decoder.capacity()
        );
        while !shutdown.is_triggered() {
            self.step(&shutdown);
        }
        tracing::info!("{} source stopped", D::SOURCE);
    }
}

impl<C, D> SamplingTask<C, D>
where
    C: SampleCapability + 'static,
    D: BlockDecoder + 'static,
{
    /// Run the loop on a dedicated named thread
    pub fn spawn(self, shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("{}-source", D::SOURCE))
            .spawn(move || self.run(shutdown))
    }
}
