//! Service wiring
//!
//! Builds the shared queue and connection state, binds the listener, and
//! starts every task on its own thread. Binding happens before any thread
//! is spawned so setup errors surface from [`Streamer::start`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::error::Result;
use crate::network::acceptor::ConnectionAcceptor;
use crate::network::connection::{ConnectionState, SharedConnection};
use crate::network::delivery::{DeliveryStats, DeliveryTask};
use crate::pipeline::diagnostics::DiagnosticsTask;
use crate::pipeline::queue::{create_shared_queue, SharedQueue};
use crate::shutdown::Shutdown;
use crate::sources::adc::AdcSource;
use crate::sources::audio::AudioSource;
use crate::sources::capability::SampleCapability;
use crate::sources::task::SourceStats;

/// Handle to a running streamer
pub struct Streamer {
    local_addr: SocketAddr,
    connection: SharedConnection,
    queue: SharedQueue,
    shutdown: Shutdown,
    audio_stats: Arc<SourceStats>,
    adc_stats: Arc<SourceStats>,
    delivery_stats: Arc<DeliveryStats>,
    handles: Vec<JoinHandle<()>>,
}

impl Streamer {
    /// Bind, then spawn acceptor, delivery, both sources and diagnostics
    pub fn start<A, D>(config: &AppConfig, audio: A, adc: D) -> Result<Self>
    where
        A: SampleCapability + 'static,
        D: SampleCapability + 'static,
    {
        config.validate()?;

        let queue = create_shared_queue(config.queue.capacity);
        let connection: SharedConnection = Arc::new(ConnectionState::new());
        let shutdown = Shutdown::new();

        let acceptor = ConnectionAcceptor::bind(&config.network, connection.clone()).map_err(|e| {
            tracing::error!("Failed to start listener on {}: {}", config.bind_addr(), e);
            e
        })?;
        let local_addr = acceptor.local_addr()?;

        let push_poll = Duration::from_millis(config.queue.push_poll_ms.max(1));
        let epoch = Instant::now();

        let delivery = DeliveryTask::new(queue.clone(), connection.clone(), config.delivery.failure_threshold)
            .with_pop_poll(Duration::from_millis(config.queue.pop_poll_ms.max(1)));
        let audio = AudioSource::audio(audio, &config.audio, queue.clone(), connection.clone(), epoch)
            .with_push_poll(push_poll);
        let adc = AdcSource::adc(adc, &config.adc, queue.clone(), connection.clone(), epoch)?
            .with_push_poll(push_poll);

        let audio_stats = audio.stats();
        let adc_stats = adc.stats();
        let delivery_stats = delivery.stats();

        let mut streamer = Self {
            local_addr,
            connection: connection.clone(),
            queue: queue.clone(),
            shutdown: shutdown.clone(),
            audio_stats: audio_stats.clone(),
            adc_stats: adc_stats.clone(),
            delivery_stats: delivery_stats.clone(),
            handles: Vec::with_capacity(5),
        };

        let diagnostics = config.diagnostics.enabled.then(|| {
            DiagnosticsTask::new(
                queue,
                connection,
                audio_stats,
                adc_stats,
                delivery_stats,
                Duration::from_millis(config.diagnostics.interval_ms.max(1)),
            )
        });

        if let Err(e) = streamer.spawn_all(acceptor, delivery, audio, adc, diagnostics) {
            tracing::error!("Failed to spawn streamer thread: {}", e);
            streamer.shutdown.trigger();
            streamer.join();
            return Err(e.into());
        }

        tracing::info!("Streamer running on {}", local_addr);
        Ok(streamer)
    }

    fn spawn_all<A, D>(
        &mut self,
        acceptor: ConnectionAcceptor,
        delivery: DeliveryTask,
        audio: AudioSource<A>,
        adc: AdcSource<D>,
        diagnostics: Option<DiagnosticsTask>,
    ) -> std::io::Result<()>
    where
        A: SampleCapability + 'static,
        D: SampleCapability + 'static,
    {
        self.handles.push(acceptor.spawn(self.shutdown.clone())?);
        self.handles.push(delivery.spawn(self.shutdown.clone())?);
        self.handles.push(audio.spawn(self.shutdown.clone())?);
        self.handles.push(adc.spawn(self.shutdown.clone())?);
        if let Some(diagnostics) = diagnostics {
            self.handles.push(diagnostics.spawn(self.shutdown.clone())?);
        }
        Ok(())
    }

    /// Address the listener actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection(&self) -> SharedConnection {
        self.connection.clone()
    }

    pub fn queue(&self) -> SharedQueue {
        self.queue.clone()
    }

    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn audio_stats(&self) -> Arc<SourceStats> {
        self.audio_stats.clone()
    }

    pub fn adc_stats(&self) -> Arc<SourceStats> {
        self.adc_stats.clone()
    }

    pub fn delivery_stats(&self) -> Arc<DeliveryStats> {
        self.delivery_stats.clone()
    }

    pub fn clients_accepted(&self) -> u64 {
        self.connection.connections()
    }

    /// Wait for every task thread to exit
    pub fn join(&mut self) {
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("unnamed").to_string();
            if handle.join().is_err() {
                tracing::error!("Thread {} panicked", name);
            }
        }
    }

    /// Trigger shutdown, close any client and wait for the tasks
    pub fn stop(mut self) {
        self.shutdown.trigger();
        self.join();
        self.connection.disconnect();
        tracing::info!("Streamer stopped");
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.shutdown.trigger();
            self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, NetworkError};
    use crate::sources::simulated::ScriptedCapability;

    fn loopback_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.network.bind_address = "127.0.0.1".to_string();
        config.network.port = 0;
        config.network.accept_poll_ms = 5;
        config.queue.push_poll_ms = 5;
        config.queue.pop_poll_ms = 5;
        config.diagnostics.enabled = false;
        config
    }

    #[test]
    fn test_start_and_stop() {
        let streamer = Streamer::start(
            &loopback_config(),
            ScriptedCapability::new("mic"),
            ScriptedCapability::new("adc"),
        )
        .unwrap();
        assert_ne!(streamer.local_addr().port(), 0);
        assert!(!streamer.connection().is_connected());
        assert_eq!(streamer.queue().capacity(), 256);
        streamer.stop();
    }

    #[test]
    fn test_bind_failure_reported_from_start() {
        let first = Streamer::start(
            &loopback_config(),
            ScriptedCapability::new("mic"),
            ScriptedCapability::new("adc"),
        )
        .unwrap();

        let mut config = loopback_config();
        config.network.port = first.local_addr().port();
        let second = Streamer::start(&config, ScriptedCapability::new("mic"), ScriptedCapability::new("adc"));
        assert!(matches!(second, Err(Error::Network(NetworkError::BindFailed(_)))));
        first.stop();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = loopback_config();
        config.audio.capacity = 0;
        let result = Streamer::start(&config, ScriptedCapability::new("mic"), ScriptedCapability::new("adc"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
