//! Error types for the sensor streaming application

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a hardware capability read
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Read timed out")]
    Timeout,

    #[error("Hardware fault: {0}")]
    Hardware(String),
}

/// Sampling task errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Block holds {count} samples but capacity is {capacity}")]
    CapacityExceeded { count: usize, capacity: usize },

    #[error("Capability read failed: {0}")]
    Read(#[from] CaptureError),

    #[error("Outbound queue closed")]
    QueueClosed,

    #[error("ADC record size {0} is smaller than one 4-byte conversion word")]
    InvalidRecordSize(usize),
}

/// Wire format errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Buffer too short: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Unknown source byte: {0}")]
    UnknownSource(u8),

    #[error("Frame too large: {0} samples")]
    FrameTooLarge(usize),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket creation failed: {0}")]
    SocketFailed(std::io::Error),

    #[error("Socket bind failed: {0}")]
    BindFailed(std::io::Error),

    #[error("Listen failed: {0}")]
    ListenFailed(std::io::Error),

    #[error("Accept failed: {0}")]
    AcceptFailed(std::io::Error),

    #[error("Send failed: {0}")]
    SendFailed(std::io::Error),

    #[error("Stream out of sync after a partial write")]
    OutOfSync,

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
