//! Software stand-ins for the sampling peripherals
//!
//! `SimulatedMicrophone` and `SimulatedAdc` pace their output at the
//! configured sample rates so the pipeline sees realistic block timing on
//! a host without the hardware. `ScriptedCapability` replays a fixed
//! sequence of reads for tests.

use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::CaptureError;
use crate::sources::adc::AdcRecord;
use crate::sources::audio::block_duration;
use crate::sources::capability::SampleCapability;

/// Little-endian bytes of 16-bit samples, as the DMA buffer holds them
pub fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Releases blocks no faster than real time
struct Pacer {
    next_due: Option<Instant>,
}

impl Pacer {
    fn new() -> Self {
        Self { next_due: None }
    }

    /// Wait for the block covering `period` to be "captured".
    /// Returns false if that would take longer than `timeout`.
    fn wait(&mut self, period: Duration, timeout: Option<Duration>) -> bool {
        let now = Instant::now();
        let due = self.next_due.map_or(now + period, |due| (due + period).max(now));
        let wait = due.saturating_duration_since(now);

        if let Some(timeout) = timeout {
            if wait > timeout {
                thread::sleep(timeout);
                return false;
            }
        }

        thread::sleep(wait);
        self.next_due = Some(due);
        true
    }
}

/// Interleaved two-slot microphone: silence on the even slot, a sine
/// tone on the odd slot
pub struct SimulatedMicrophone {
    sample_rate: u32,
    tone_hz: f32,
    amplitude: f32,
    phase: f32,
    pacer: Pacer,
}

impl SimulatedMicrophone {
    /// `sample_rate` is the raw interleaved rate
    pub fn new(sample_rate: u32, tone_hz: f32) -> Self {
        Self {
            sample_rate,
            tone_hz,
            amplitude: 8000.0,
            phase: 0.0,
            pacer: Pacer::new(),
        }
    }
}

impl SampleCapability for SimulatedMicrophone {
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, CaptureError> {
        let pairs = buf.len() / 4;
        if !self.pacer.wait(block_duration(pairs * 2, self.sample_rate), timeout) {
            return Err(CaptureError::Timeout);
        }

        // Mono rate is half the raw interleaved rate
        let step = TAU * self.tone_hz / (self.sample_rate as f32 / 2.0);
        for pair in buf.chunks_exact_mut(4) {
            let value = (self.phase.sin() * self.amplitude) as i16;
            pair[..2].copy_from_slice(&0i16.to_le_bytes());
            pair[2..].copy_from_slice(&value.to_le_bytes());
            self.phase = (self.phase + step) % TAU;
        }
        Ok(pairs * 4)
    }

    fn name(&self) -> &str {
        "simulated-microphone"
    }
}

/// ADC cycling through a channel pattern with a per-channel ramp
pub struct SimulatedAdc {
    channels: Vec<u8>,
    sample_rate: u32,
    record_size: usize,
    conversions: u64,
    pacer: Pacer,
}

impl SimulatedAdc {
    pub fn new(channels: Vec<u8>, sample_rate: u32, record_size: usize) -> Self {
        Self {
            channels,
            sample_rate,
            record_size,
            conversions: 0,
            pacer: Pacer::new(),
        }
    }
}

impl SampleCapability for SimulatedAdc {
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, CaptureError> {
        if self.channels.is_empty() || self.record_size < 4 {
            return Err(CaptureError::Hardware("empty conversion pattern".into()));
        }
        let records = buf.len() / self.record_size;
        if !self.pacer.wait(block_duration(records, self.sample_rate), timeout) {
            return Err(CaptureError::Timeout);
        }

        for record in buf.chunks_exact_mut(self.record_size) {
            let slot = (self.conversions % self.channels.len() as u64) as usize;
            let channel = self.channels[slot];
            let round = self.conversions / self.channels.len() as u64;
            let data = ((round * (channel as u64 + 1) * 7) % 4096) as u16;
            record[..4].copy_from_slice(&AdcRecord { channel, data, unit: 0 }.encode());
            record[4..].fill(0);
            self.conversions += 1;
        }
        Ok(records * self.record_size)
    }

    fn name(&self) -> &str {
        "simulated-adc"
    }
}

enum ScriptStep {
    Block(Vec<u8>),
    /// Report `n` bytes read without touching the buffer
    Misreport(usize),
    Error(CaptureError),
}

/// Replays a fixed sequence of reads, then times out forever
pub struct ScriptedCapability {
    name: String,
    steps: VecDeque<ScriptStep>,
}

impl ScriptedCapability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: VecDeque::new(),
        }
    }

    pub fn push_block(&mut self, bytes: Vec<u8>) {
        self.steps.push_back(ScriptStep::Block(bytes));
    }

    pub fn push_misreport(&mut self, bytes_read: usize) {
        self.steps.push_back(ScriptStep::Misreport(bytes_read));
    }

    pub fn push_error(&mut self, error: CaptureError) {
        self.steps.push_back(ScriptStep::Error(error));
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl SampleCapability for ScriptedCapability {
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, CaptureError> {
        match self.steps.pop_front() {
            Some(ScriptStep::Block(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Some(ScriptStep::Misreport(n)) => Ok(n),
            Some(ScriptStep::Error(e)) => Err(e),
            None => {
                thread::sleep(timeout.unwrap_or(Duration::from_millis(10)).min(Duration::from_millis(10)));
                Err(CaptureError::Timeout)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
