//! TCP transport: single-client admission, delivery and the receiving client

pub mod acceptor;
pub mod client;
pub mod connection;
pub mod delivery;

pub use acceptor::{create_listener, ConnectionAcceptor};
pub use client::{demux_adc, FrameReader, ThroughputMeter};
pub use connection::{
    Client, ClientStream, ClientWriter, ConnectionState, ConnectionStatus, PartialWrite, SharedConnection,
};
pub use delivery::{DeliveryOutcome, DeliveryStats, DeliveryStatsSnapshot, DeliveryTask};
