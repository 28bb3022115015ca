//! Mock transport for testing
//!
//! Two modes, usable together:
//! - scripted: bytes queued with [`MockTransport::inject_read`] are returned by reads
//! - responder: a closure sees every written packet and returns the device reply

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Mock transport for unit testing
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    packets: Vec<Vec<u8>>,
    responder: Option<Responder>,
    write_limit: Option<usize>,
    closed: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                packets: Vec::new(),
                responder: None,
                write_limit: None,
                closed: false,
            })),
        }
    }

    /// Create a mock whose replies are produced by `responder`
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        let mock = Self::new();
        mock.inner.lock().responder = Some(Box::new(responder));
        mock
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Get written data split per `write` call
    pub fn written_packets(&self) -> Vec<Vec<u8>> {
        self.inner.lock().packets.clone()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        let mut inner = self.inner.lock();
        inner.write_buffer.clear();
        inner.packets.clear();
    }

    /// Accept at most `limit` bytes per write
    pub fn set_write_limit(&self, limit: usize) {
        self.inner.lock().write_limit = Some(limit);
    }

    /// Make every subsequent operation fail as if the port vanished
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::Other("mock port closed".to_string()));
        }
        let available = inner.read_buffer.len().min(buffer.len());

        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..available)) {
            *slot = byte;
        }

        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.closed {
            return Err(Error::Other("mock port closed".to_string()));
        }
        let accepted = inner.write_limit.map_or(data.len(), |l| l.min(data.len()));
        let data = &data[..accepted];

        inner.write_buffer.extend_from_slice(data);
        inner.packets.push(data.to_vec());

        if let Some(responder) = inner.responder.as_mut() {
            let reply = responder(data);
            inner.read_buffer.extend(reply);
        }
        Ok(accepted)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn discard_input(&mut self) -> Result<()> {
        // Scripted bytes are queued before the request goes out, so only a
        // responder-driven mock may drop stale input.
        let mut inner = self.inner.lock();
        if inner.responder.is_some() {
            inner.read_buffer.clear();
        }
        Ok(())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}
