//! Sampling sources
//!
//! Each source owns one hardware capability, converts its raw blocks into
//! frames and hands them to the outbound queue. Sources only read the
//! connection state: while no client is attached blocks are dropped
//! before a frame is built.

pub mod adc;
pub mod audio;
pub mod capability;
pub mod simulated;
pub mod task;

pub use adc::{AdcDecoder, AdcRecord, AdcSource};
pub use audio::{AudioDecoder, AudioSource};
pub use capability::SampleCapability;
pub use simulated::{ScriptedCapability, SimulatedAdc, SimulatedMicrophone};
pub use task::{BlockDecoder, BlockOutcome, SamplingTask, SourceStats, SourceStatsSnapshot};
