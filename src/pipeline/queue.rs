//! Bounded outbound queue between the sources and delivery
//!
//! Multi-producer, single-consumer FIFO backed by a bounded crossbeam
//! channel. A full queue blocks the producer (backpressure); an empty
//! queue blocks the consumer. Frames are moved in and out, never shared.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::Frame;
use crate::shutdown::Shutdown;

/// Bounded FIFO of frames awaiting delivery
pub struct OutboundQueue {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    capacity: usize,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    stalled_pushes: AtomicU64,
}

impl OutboundQueue {
    /// Create a new queue holding at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            stalled_pushes: AtomicU64::new(0),
        }
    }

    /// Push a frame, blocking until a slot is free
    pub fn push(&self, frame: Frame) {
        let frame = match self.tx.try_send(frame) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(TrySendError::Full(frame)) | Err(TrySendError::Disconnected(frame)) => frame,
        };

        self.stalled_pushes.fetch_add(1, Ordering::Relaxed);
        // Both channel ends live in `self`, so the send cannot see a
        // disconnected receiver.
        if self.tx.send(frame).is_ok() {
            self.enqueued.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Push a frame, giving it back if no slot frees up within `timeout`
    pub fn push_timeout(&self, frame: Frame, timeout: Duration) -> Result<(), Frame> {
        let frame = match self.tx.try_send(frame) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            Err(TrySendError::Full(frame)) | Err(TrySendError::Disconnected(frame)) => frame,
        };

        self.stalled_pushes.fetch_add(1, Ordering::Relaxed);
        match self.tx.send_timeout(frame, timeout) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(frame)) | Err(SendTimeoutError::Disconnected(frame)) => {
                Err(frame)
            }
        }
    }

    /// Blocking push that re-checks `shutdown` every `poll` while stalled.
    ///
    /// Returns false when shutdown interrupted the push; the frame is dropped.
    pub fn push_until(&self, frame: Frame, shutdown: &Shutdown, poll: Duration) -> bool {
        let mut frame = match self.tx.try_send(frame) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            Err(TrySendError::Full(frame)) | Err(TrySendError::Disconnected(frame)) => frame,
        };

        self.stalled_pushes.fetch_add(1, Ordering::Relaxed);
        loop {
            if shutdown.is_triggered() {
                return false;
            }
            match self.tx.send_timeout(frame, poll) {
                Ok(()) => {
                    self.enqueued.fetch_add(1, Ordering::Relaxed);
                    return true;
                }
                Err(SendTimeoutError::Timeout(returned)) => frame = returned,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    /// Pop the oldest frame, blocking until one is available
    pub fn pop(&self) -> Option<Frame> {
        let frame = self.rx.recv().ok()?;
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    /// Pop the oldest frame, waiting at most `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => {
                self.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(frame)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Get current queue depth
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.len(),
            capacity: self.capacity,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            stalled_pushes: self.stalled_pushes.load(Ordering::Relaxed),
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
    pub enqueued: u64,
    pub dequeued: u64,
    /// Pushes that found the queue full and had to wait
    pub stalled_pushes: u64,
}

/// Thread-safe handle to the outbound queue
pub type SharedQueue = Arc<OutboundQueue>;

/// Create a new shared queue
pub fn create_shared_queue(capacity: usize) -> SharedQueue {
    Arc::new(OutboundQueue::new(capacity))
}
