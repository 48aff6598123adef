//! Frame pipeline between the sampling tasks and the network

pub mod diagnostics;
pub mod queue;
pub mod streamer;

pub use diagnostics::DiagnosticsTask;
pub use queue::{create_shared_queue, OutboundQueue, QueueStats, SharedQueue};
pub use streamer::Streamer;
