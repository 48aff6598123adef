//! End-to-end behaviour over loopback TCP with simulated peripherals

use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use lan_sensor_streamer::codec::FrameDecoder;
use lan_sensor_streamer::config::AppConfig;
use lan_sensor_streamer::pipeline::Streamer;
use lan_sensor_streamer::protocol::{unpack_adc_sample, Frame, SourceKind};
use lan_sensor_streamer::sources::{ScriptedCapability, SimulatedAdc, SimulatedMicrophone};

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

fn start_simulated(config: &AppConfig) -> Streamer {
    Streamer::start(
        config,
        SimulatedMicrophone::new(config.audio.sample_rate, 440.0),
        SimulatedAdc::new(config.adc.channels.clone(), config.adc.sample_rate, config.adc.record_size),
    )
    .unwrap()
}

/// Read until at least `count` frames arrived or `limit` elapsed
fn read_frames(stream: &mut TcpStream, count: usize, limit: Duration) -> Vec<Frame> {
    stream.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
    let deadline = Instant::now() + limit;
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    let mut buf = [0u8; 4096];

    while frames.len() < count && Instant::now() < deadline {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => frames.extend(decoder.feed(&buf[..n]).unwrap()),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => panic!("read failed: {}", e),
        }
    }
    frames
}

fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).unwrap()
}

#[test]
fn test_client_receives_both_sources() {
    let config = loopback_config();
    let streamer = start_simulated(&config);
    let mut client = connect(streamer.local_addr());
    assert!(streamer.connection().wait_for(true, Duration::from_secs(5)));

    let frames = read_frames(&mut client, 40, Duration::from_secs(10));
    assert!(frames.len() >= 40, "only {} frames", frames.len());

    let audio: Vec<&Frame> = frames.iter().filter(|f| f.source() == SourceKind::Audio).collect();
    let adc: Vec<&Frame> = frames.iter().filter(|f| f.source() == SourceKind::Adc).collect();
    assert!(!audio.is_empty());
    assert!(!adc.is_empty());

    for frame in &audio {
        assert_eq!(frame.sample_count(), 256);
        assert_eq!(frame.metadata(), 0);
    }
    for frame in &adc {
        assert_eq!(frame.sample_count(), 256);
        for &sample in frame.samples() {
            let (channel, _) = unpack_adc_sample(sample);
            assert!(config.adc.channels.contains(&channel));
        }
    }

    // Per-source order is preserved end to end
    for window in audio.windows(2) {
        assert!(window[0].timestamp() <= window[1].timestamp());
    }
    for window in adc.windows(2) {
        assert!(window[0].timestamp() <= window[1].timestamp());
    }

    streamer.stop();
}

#[test]
fn test_nothing_enqueued_while_disconnected() {
    let streamer = start_simulated(&loopback_config());
    std::thread::sleep(Duration::from_millis(200));

    assert_eq!(streamer.queue().stats().enqueued, 0);
    assert!(streamer.audio_stats().snapshot().dropped_disconnected > 0);
    assert!(streamer.adc_stats().snapshot().dropped_disconnected > 0);
    assert_eq!(streamer.delivery_stats().snapshot().frames_sent, 0);
    streamer.stop();
}

#[test]
fn test_second_client_waits_for_first() {
    let streamer = start_simulated(&loopback_config());
    let addr = streamer.local_addr();

    let mut first = connect(addr);
    assert!(streamer.connection().wait_for(true, Duration::from_secs(5)));
    assert!(!read_frames(&mut first, 1, Duration::from_secs(5)).is_empty());

    // Completes the handshake in the backlog but is not served yet
    let mut second = connect(addr);
    assert!(read_frames(&mut second, 1, Duration::from_millis(300)).is_empty());
    assert_eq!(streamer.clients_accepted(), 1);

    // Write failures against the closed peer eventually drop it
    drop(first);
    assert!(streamer.connection().wait_for(false, Duration::from_secs(10)));

    let frames = read_frames(&mut second, 1, Duration::from_secs(10));
    assert!(!frames.is_empty());
    assert_eq!(streamer.clients_accepted(), 2);
    assert!(streamer.delivery_stats().snapshot().disconnects >= 1);

    streamer.stop();
}

#[test]
fn test_shutdown_with_client_attached() {
    let streamer = Streamer::start(
        &loopback_config(),
        ScriptedCapability::new("mic"),
        ScriptedCapability::new("adc"),
    )
    .unwrap();
    let _client = connect(streamer.local_addr());
    assert!(streamer.connection().wait_for(true, Duration::from_secs(5)));

    let connection = streamer.connection();
    streamer.stop();
    assert!(!connection.is_connected());
}
