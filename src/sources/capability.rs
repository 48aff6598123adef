//! Hardware capability port
//!
//! The DMA-backed peripherals are external collaborators. Sources see them
//! only through this trait, so the pipeline runs unchanged against real
//! drivers, the simulators, or scripted test doubles.

use std::time::Duration;

use crate::error::CaptureError;

/// Blocking block reader over a sampling peripheral
pub trait SampleCapability: Send {
    /// Fill `buf` with up to `buf.len()` bytes.
    ///
    /// `timeout` of `None` waits for data indefinitely. A timeout may be
    /// reported either as `Ok(0)` or as `Err(CaptureError::Timeout)`; both
    /// mean "no block this time" rather than a fault.
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, CaptureError>;

    /// Name used in log lines
    fn name(&self) -> &str {
        "capability"
    }
}

impl<T: SampleCapability + ?Sized> SampleCapability for Box<T> {
    fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, CaptureError> {
        (**self).read(buf, timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
