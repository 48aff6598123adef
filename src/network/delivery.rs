//! Delivery task: drains the outbound queue onto the active client
//!
//! Each frame goes out as two ordered writes, header then payload. Write
//! failures are counted; the count resets on any complete frame. Once
//! the consecutive count exceeds the threshold, the client is closed and
//! the connection state returns to disconnected. A frame that fails to
//! send is dropped, never re-queued.
//!
//! A write that fails after part of a frame reached the client leaves the
//! byte stream misaligned. From then on every frame for that client counts
//! as a failure without being written, so the threshold drops it.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::codec::encoder::FrameEncoder;
use crate::protocol::HEADER_SIZE;
use crate::error::NetworkError;
use crate::network::connection::{ClientWriter, SharedConnection};
use crate::pipeline::queue::SharedQueue;
use crate::protocol::Frame;
use crate::shutdown::Shutdown;

/// Result of handling one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Header and payload both written
    Sent,
    /// No client connected; frame dropped
    Discarded,
    /// A write failed; frame dropped, failure counted
    Failed,
    /// A write failed and pushed the count over the threshold; client dropped
    Disconnected,
}

/// Delivery counters
#[derive(Debug, Default)]
pub struct DeliveryStats {
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    write_failures: AtomicU64,
    frames_discarded: AtomicU64,
    disconnects: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStatsSnapshot {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub write_failures: u64,
    pub frames_discarded: u64,
    pub disconnects: u64,
    pub consecutive_failures: u64,
}

/// Consumer side of the outbound queue
pub struct DeliveryTask {
    queue: SharedQueue,
    connection: SharedConnection,
    encoder: FrameEncoder,
    failure_threshold: u32,
    consecutive_failures: u32,
    /// Cached handle onto the active client
    writer: Option<ClientWriter>,
    /// Set once a partial frame went out on `writer`
    out_of_sync: bool,
    pop_poll: Duration,
    stats: Arc<DeliveryStats>,
}

impl DeliveryTask {
    pub fn new(queue: SharedQueue, connection: SharedConnection, failure_threshold: u32) -> Self {
        Self {
            queue,
            connection,
            encoder: FrameEncoder::new(),
            failure_threshold,
            consecutive_failures: 0,
            writer: None,
            out_of_sync: false,
            pop_poll: Duration::from_millis(100),
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    /// Interval at which an idle pop re-checks shutdown
    pub fn with_pop_poll(mut self, poll: Duration) -> Self {
        self.pop_poll = poll;
        self
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        self.stats.clone()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Write one frame to the active client, if any
    pub fn deliver(&mut self, frame: Frame) -> DeliveryOutcome {
        match self.refresh_writer() {
            Ok(true) => {}
            Ok(false) => {
                // A producer saw the client just before it was dropped
                self.stats.frames_discarded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Discarding {} frame, no client", frame.source());
                return DeliveryOutcome::Discarded;
            }
            Err(e) => return self.record_failure(e),
        }

        if self.out_of_sync {
            return self.record_failure(NetworkError::OutOfSync);
        }

        let encoded = self.encoder.encode(&frame);
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => return DeliveryOutcome::Discarded,
        };
        let sent = match writer.write_all(&encoded.header) {
            Ok(()) => writer
                .write_all(&encoded.payload)
                .map_err(|e| (HEADER_SIZE + e.written, e.error)),
            Err(e) => Err((e.written, e.error)),
        };

        match sent {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.stats.consecutive_failures.store(0, Ordering::Relaxed);
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_sent.fetch_add(encoded.wire_len() as u64, Ordering::Relaxed);
                DeliveryOutcome::Sent
            }
            Err((on_wire, error)) => {
                if on_wire > 0 {
                    tracing::warn!(
                        "Partial frame ({} of {} bytes) sent to {}, stream out of sync",
                        on_wire,
                        encoded.wire_len(),
                        writer.peer()
                    );
                    self.out_of_sync = true;
                }
                self.record_failure(NetworkError::SendFailed(error))
            }
        }
    }

    /// Point the cached writer at the active client. Returns false when
    /// no client is connected.
    fn refresh_writer(&mut self) -> Result<bool, NetworkError> {
        let active = match self.connection.active_id() {
            Some(id) => id,
            None => {
                self.writer = None;
                self.out_of_sync = false;
                return Ok(false);
            }
        };
        if self.writer.as_ref().map(ClientWriter::id) == Some(active) {
            return Ok(true);
        }

        self.out_of_sync = false;
        self.writer = self.connection.writer()?;
        Ok(self.writer.is_some())
    }

    fn record_failure(&mut self, error: NetworkError) -> DeliveryOutcome {
        self.consecutive_failures += 1;
        self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            "Error sending frame ({} consecutive): {}",
            self.consecutive_failures,
            error
        );

        if self.consecutive_failures > self.failure_threshold {
            match self.writer.take() {
                Some(writer) => self.connection.disconnect_client(writer.id()),
                None => self.connection.disconnect(),
            };
            self.out_of_sync = false;
            self.consecutive_failures = 0;
            self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
            self.stats.consecutive_failures.store(0, Ordering::Relaxed);
            tracing::warn!(
                "Dropped client after exceeding {} consecutive write failures",
                self.failure_threshold
            );
            return DeliveryOutcome::Disconnected;
        }

        self.stats
            .consecutive_failures
            .store(self.consecutive_failures as u64, Ordering::Relaxed);
        DeliveryOutcome::Failed
    }

    /// Drain the queue until shutdown
    pub fn run(mut self, shutdown: Shutdown) {
        tracing::info!("Delivery started (failure threshold {})", self.failure_threshold);
        while !shutdown.is_triggered() {
            if let Some(frame) = self.queue.pop_timeout(self.pop_poll) {
                self.deliver(frame);
            }
        }
        let stats = self.encoder.stats();
        tracing::info!(
            "Delivery stopped: {} frames encoded, {:.1} KB",
            stats.frames_encoded,
            stats.bytes_produced as f64 / 1024.0
        );
    }

    /// Run the drain loop on a dedicated named thread
    pub fn spawn(self, shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("delivery".to_string())
            .spawn(move || self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decoder::FrameDecoder;
    use crate::network::connection::tests::MemoryStream;
    use crate::network::connection::{Client, ConnectionState};
    use crate::pipeline::queue::create_shared_queue;
    use crate::protocol::SourceKind;

    fn frame(timestamp: u64) -> Frame {
        Frame::new(SourceKind::Audio, timestamp, vec![1, 2, 3]).unwrap()
    }

    fn setup() -> (DeliveryTask, SharedConnection, MemoryStream) {
        let connection = Arc::new(ConnectionState::new());
        let stream = MemoryStream::new("peer");
        let handles = stream.clone();
        connection.connect(Client::new(stream)).unwrap();
        let task = DeliveryTask::new(create_shared_queue(8), connection.clone(), 10);
        (task, connection, handles)
    }

    #[test]
    fn test_frames_written_header_then_payload() {
        let (mut task, _connection, stream) = setup();
        assert_eq!(task.deliver(frame(1)), DeliveryOutcome::Sent);
        assert_eq!(task.deliver(frame(2)), DeliveryOutcome::Sent);

        let written = stream.written.lock().clone();
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&written).unwrap();
        assert_eq!(frames, vec![frame(1), frame(2)]);

        let stats = task.stats().snapshot();
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.bytes_sent, 2 * 18);
    }

    #[test]
    fn test_disconnect_after_eleventh_consecutive_failure() {
        let (mut task, connection, stream) = setup();
        stream.fail.store(true, Ordering::SeqCst);

        for i in 1..=10 {
            assert_eq!(task.deliver(frame(i)), DeliveryOutcome::Failed);
            assert_eq!(task.consecutive_failures(), i as u32);
            assert!(connection.is_connected());
        }

        assert_eq!(task.deliver(frame(11)), DeliveryOutcome::Disconnected);
        assert!(!connection.is_connected());
        assert_eq!(task.consecutive_failures(), 0);
        assert!(stream.closed.load(Ordering::SeqCst));

        // Further frames are discarded without another transition
        assert_eq!(task.deliver(frame(12)), DeliveryOutcome::Discarded);
        let stats = task.stats().snapshot();
        assert_eq!(stats.disconnects, 1);
        assert_eq!(stats.write_failures, 11);
        assert_eq!(stats.frames_discarded, 1);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (mut task, connection, stream) = setup();

        stream.fail.store(true, Ordering::SeqCst);
        for i in 0..10 {
            task.deliver(frame(i));
        }
        assert_eq!(task.consecutive_failures(), 10);

        stream.fail.store(false, Ordering::SeqCst);
        assert_eq!(task.deliver(frame(10)), DeliveryOutcome::Sent);
        assert_eq!(task.consecutive_failures(), 0);

        stream.fail.store(true, Ordering::SeqCst);
        for i in 0..10 {
            assert_eq!(task.deliver(frame(i)), DeliveryOutcome::Failed);
        }
        assert!(connection.is_connected());
    }

    #[test]
    fn test_partial_write_keeps_failing_until_disconnect() {
        let (mut task, connection, stream) = setup();

        // Client takes five header bytes, then stalls
        *stream.budget.lock() = Some(5);
        assert_eq!(task.deliver(frame(1)), DeliveryOutcome::Failed);
        assert_eq!(stream.written.lock().len(), 5);

        // Client recovers, but the stream is misaligned: nothing more is written
        *stream.budget.lock() = None;
        for i in 2..=10 {
            assert_eq!(task.deliver(frame(i)), DeliveryOutcome::Failed);
            assert!(connection.is_connected());
        }
        assert_eq!(task.deliver(frame(11)), DeliveryOutcome::Disconnected);
        assert!(!connection.is_connected());
        assert_eq!(stream.written.lock().len(), 5);
        assert_eq!(task.stats().snapshot().frames_sent, 0);
    }

    #[test]
    fn test_failure_before_any_byte_keeps_stream_usable() {
        let (mut task, _connection, stream) = setup();

        *stream.budget.lock() = Some(0);
        assert_eq!(task.deliver(frame(1)), DeliveryOutcome::Failed);

        *stream.budget.lock() = None;
        assert_eq!(task.deliver(frame(2)), DeliveryOutcome::Sent);
        assert_eq!(task.consecutive_failures(), 0);

        let frames = FrameDecoder::new().feed(&stream.written.lock()).unwrap();
        assert_eq!(frames, vec![frame(2)]);
    }

    #[test]
    fn test_new_client_starts_in_sync() {
        let (mut task, connection, stream) = setup();
        *stream.budget.lock() = Some(3);
        assert_eq!(task.deliver(frame(1)), DeliveryOutcome::Failed);

        // Drop the misaligned client and admit a fresh one
        connection.disconnect();
        let next = MemoryStream::new("next");
        let written = next.written.clone();
        connection.connect(Client::new(next)).unwrap();

        assert_eq!(task.deliver(frame(2)), DeliveryOutcome::Sent);
        let frames = FrameDecoder::new().feed(&written.lock()).unwrap();
        assert_eq!(frames, vec![frame(2)]);
    }

    #[test]
    fn test_discard_when_disconnected() {
        let connection = Arc::new(ConnectionState::new());
        let mut task = DeliveryTask::new(create_shared_queue(8), connection, 10);
        assert_eq!(task.deliver(frame(0)), DeliveryOutcome::Discarded);
        assert_eq!(task.consecutive_failures(), 0);
    }

    #[test]
    fn test_run_drains_queue_and_stops() {
        let (task, _connection, stream) = setup();
        let queue = task.queue.clone();
        let stats = task.stats();
        let task = task.with_pop_poll(Duration::from_millis(5));
        let shutdown = Shutdown::new();
        let handle = task.spawn(shutdown.clone()).unwrap();

        for i in 0..5 {
            queue.push(frame(i));
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while stats.snapshot().frames_sent < 5 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        shutdown.trigger();
        handle.join().unwrap();
        assert_eq!(stats.snapshot().frames_sent, 5);
        assert_eq!(stream.written.lock().len(), 5 * 18);
    }
}
