//! Transport layer for I/O abstraction

use crate::error::Result;

mod serial;
pub use serial::SerialTransport;

mod mock;
pub use mock::MockTransport;

/// Transport trait for gimbal communication
///
/// Reads are non-blocking or short-blocking: a read that times out with no
/// data returns `Ok(0)`. Any `Err` means the port itself is unusable.
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Drop any bytes sitting in the receive buffer
    ///
    /// Called before each request so a late response from a timed-out
    /// request cannot be mistaken for the next one.
    fn discard_input(&mut self) -> Result<()> {
        Ok(())
    }
}
