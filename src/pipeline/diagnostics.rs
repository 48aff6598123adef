//! Periodic status line: queue depth, connection and per-task counters

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::network::connection::SharedConnection;
use crate::network::delivery::DeliveryStats;
use crate::pipeline::queue::SharedQueue;
use crate::shutdown::Shutdown;
use crate::sources::task::SourceStats;

pub struct DiagnosticsTask {
    queue: SharedQueue,
    connection: SharedConnection,
    audio: Arc<SourceStats>,
    adc: Arc<SourceStats>,
    delivery: Arc<DeliveryStats>,
    interval: Duration,
}

impl DiagnosticsTask {
    pub fn new(
        queue: SharedQueue,
        connection: SharedConnection,
        audio: Arc<SourceStats>,
        adc: Arc<SourceStats>,
        delivery: Arc<DeliveryStats>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            connection,
            audio,
            adc,
            delivery,
            interval,
        }
    }

    /// Render the current status line
    pub fn report(&self) -> String {
        let queue = self.queue.stats();
        let audio = self.audio.snapshot();
        let adc = self.adc.snapshot();
        let delivery = self.delivery.snapshot();
        format!(
            "{} | queue {}/{} (stalls {}) | audio {} enq, {} dropped | adc {} enq, {} dropped, {} read errors | sent {} ({:.1} KB), failures {}, disconnects {}",
            self.connection.status(),
            queue.depth,
            queue.capacity,
            queue.stalled_pushes,
            audio.frames_enqueued,
            audio.dropped_disconnected + audio.rejected,
            adc.frames_enqueued,
            adc.dropped_disconnected + adc.rejected,
            adc.read_errors,
            delivery.frames_sent,
            delivery.bytes_sent as f64 / 1024.0,
            delivery.write_failures,
            delivery.disconnects,
        )
    }

    pub fn run(self, shutdown: Shutdown) {
        let tick = Duration::from_millis(50).min(self.interval);
        let mut last = Instant::now();
        while !shutdown.is_triggered() {
            thread::sleep(tick);
            if last.elapsed() >= self.interval {
                tracing::info!("{}", self.report());
                last = Instant::now();
            }
        }
    }

    pub fn spawn(self, shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("diagnostics".to_string())
            .spawn(move || self.run(shutdown))
    }
}
