//! # LAN Sensor Streamer
//!
//! Real-time streaming of time-stamped sensor samples from two independent
//! sources to exactly one TCP client.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                               DEVICE                                  │
//! │  ┌──────────────────┐                        ┌──────────────────┐     │
//! │  │    Microphone    │                        │   Dual-channel   │     │
//! │  │   (interleaved)  │                        │       ADC        │     │
//! │  └────────┬─────────┘                        └────────┬─────────┘     │
//! │           ▼                                           ▼               │
//! │  ┌──────────────────┐                        ┌──────────────────┐     │
//! │  │   AudioSource    │                        │    AdcSource     │     │
//! │  │  (odd-slot mono) │                        │ (chan<<12|data)  │     │
//! │  └────────┬─────────┘                        └────────┬─────────┘     │
//! │           │      gate on ConnectionState              │               │
//! │           └──────────────────┬────────────────────────┘               │
//! │                              ▼                                        │
//! │           ┌──────────────────────────────────────┐                    │
//! │           │  OutboundQueue (bounded FIFO, 256)   │                    │
//! │           └──────────────────┬───────────────────┘                    │
//! │                              ▼                                        │
//! │           ┌──────────────────────────────────────┐   ┌────────────┐   │
//! │           │ DeliveryTask  [header][payload]      │◀─▶│ Connection │   │
//! │           │ consecutive-failure threshold        │   │   State    │   │
//! │           └──────────────────┬───────────────────┘   └─────▲──────┘   │
//! │                              │                             │          │
//! │                              │          ┌──────────────────┴───────┐  │
//! │                              │          │ ConnectionAcceptor       │  │
//! │                              │          │ (listen backlog 1)       │  │
//! │                              │          └──────────────────────────┘  │
//! └──────────────────────────────┼────────────────────────────────────────┘
//!                                │ TCP
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │  Receiver (client)   │
//!                     └──────────────────────┘
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod protocol;
pub mod shutdown;
pub mod sources;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default TCP port for the sample stream
    pub const DEFAULT_TCP_PORT: u16 = 5000;

    /// Listen backlog; a second client waits in the OS queue
    pub const LISTEN_BACKLOG: i32 = 1;

    /// Mono samples per audio frame
    pub const AUDIO_CAPACITY: usize = 256;

    /// Conversion records per ADC frame
    pub const ADC_CAPACITY: usize = 256;

    /// Upper bound on samples carried by any frame
    pub const MAX_FRAME_SAMPLES: usize = 256;

    /// Width of one raw microphone sample in bytes
    pub const AUDIO_SAMPLE_WIDTH: usize = 2;

    /// Size of one packed ADC conversion record in bytes
    pub const ADC_RECORD_SIZE: usize = 4;

    /// Default microphone sample rate in Hz (raw, before channel skip)
    pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48_000;

    /// Default ADC conversion rate in Hz
    pub const DEFAULT_ADC_SAMPLE_RATE: u32 = 16_000;

    /// ADC read timeout in milliseconds
    pub const DEFAULT_ADC_TIMEOUT_MS: u64 = 1000;

    /// Outbound queue capacity (in frames)
    pub const QUEUE_CAPACITY: usize = 256;

    /// Consecutive write failures tolerated before disconnecting
    pub const FAILURE_THRESHOLD: u32 = 10;

    /// Interval between diagnostic log lines in milliseconds
    pub const DEFAULT_DIAGNOSTICS_INTERVAL_MS: u64 = 3000;
}
