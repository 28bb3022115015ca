//! Serialized request/response access to the gimbal
//!
//! A `GimbalLink` owns the transport. Callers wrap it in a single mutex so at
//! most one request is on the wire at a time; every method here completes a
//! full round-trip or fails with a distinct [`ProtocolError`], never leaving
//! partial state behind.

use crate::error::ProtocolError;
use crate::protocol::{self, MEASURE_RESPONSE_LEN, Request};
use crate::transport::Transport;
use std::thread;
use std::time::{Duration, Instant};

/// Idle wait between empty reads while a response is pending
const READ_IDLE: Duration = Duration::from_millis(1);

/// Request/response link over a byte transport
pub struct GimbalLink {
    transport: Box<dyn Transport>,
    timeout: Duration,
}

impl GimbalLink {
    /// Create a link with the given response timeout
    pub fn new(transport: Box<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Write every byte of `bytes` and flush
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let written = self
            .transport
            .write(bytes)
            .map_err(|_| ProtocolError::PortClosed)?;
        if written != bytes.len() {
            return Err(ProtocolError::ShortWrite {
                written,
                expected: bytes.len(),
            });
        }
        self.transport
            .flush()
            .map_err(|_| ProtocolError::PortClosed)
    }

    /// Read exactly `n` bytes before the timeout expires
    pub fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, ProtocolError> {
        let deadline = Instant::now() + self.timeout;
        let mut buffer = vec![0u8; n];
        let mut filled = 0;

        while filled < n {
            let count = self
                .transport
                .read(&mut buffer[filled..])
                .map_err(|_| ProtocolError::PortClosed)?;
            filled += count;
            if filled == n {
                break;
            }
            if Instant::now() >= deadline {
                log::debug!("Gimbal: RX timeout with {}/{} bytes", filled, n);
                return Err(ProtocolError::Timeout { expected: n });
            }
            if count == 0 {
                thread::sleep(READ_IDLE);
            }
        }

        Ok(buffer)
    }

    /// Send a request and return its raw response
    pub fn transact(&mut self, request: &Request) -> Result<Vec<u8>, ProtocolError> {
        self.transport
            .discard_input()
            .map_err(|_| ProtocolError::PortClosed)?;

        let packet = request.encode();
        log::trace!("Gimbal: TX {:?} {:02X?}", request.request_id(), packet);
        self.write_all(&packet)?;

        let response = self.read_exact(request.response_len())?;
        log::trace!("Gimbal: RX {:02X?}", response);
        Ok(response)
    }

    /// Send a set-type request and require an ACK
    pub fn command(&mut self, request: &Request) -> Result<(), ProtocolError> {
        let response = self.transact(request)?;
        protocol::check_ack(response[0])
    }

    /// Query current (tilt, pan)
    pub fn measure(&mut self) -> Result<(f32, f32), ProtocolError> {
        let response = self.transact(&Request::MeasureDeg)?;
        let response: [u8; MEASURE_RESPONSE_LEN] = response
            .try_into()
            .map_err(|_| ProtocolError::Malformed("measure response length"))?;
        protocol::decode_measure_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_measure_response;
    use crate::transport::MockTransport;

    fn link(mock: &MockTransport) -> GimbalLink {
        GimbalLink::new(Box::new(mock.clone()), Duration::from_millis(20))
    }

    #[test]
    fn test_command_ack() {
        let mock = MockTransport::new();
        mock.inject_read(&[0x00]);
        let mut link = link(&mock);

        link.command(&Request::StatusLed(true)).unwrap();
        assert_eq!(mock.get_written(), Request::StatusLed(true).encode());
    }

    #[test]
    fn test_command_nack() {
        let mock = MockTransport::new();
        mock.inject_read(&[0x01]);
        let mut link = link(&mock);

        assert_eq!(
            link.command(&Request::ArmLed(true)),
            Err(ProtocolError::Nack(0x01))
        );
    }

    #[test]
    fn test_measure() {
        let mock = MockTransport::new();
        mock.inject_read(&encode_measure_response(12.0, -3.0));
        let mut link = link(&mock);

        assert_eq!(link.measure().unwrap(), (12.0, -3.0));
        assert_eq!(mock.get_written(), vec![0x09, 0x03]);
    }

    #[test]
    fn test_partial_response_times_out() {
        let mock = MockTransport::new();
        mock.inject_read(&encode_measure_response(1.0, 2.0)[..5]);
        let mut link = link(&mock);

        assert_eq!(
            link.measure(),
            Err(ProtocolError::Timeout {
                expected: MEASURE_RESPONSE_LEN
            })
        );
    }

    #[test]
    fn test_corrupted_measure() {
        let mock = MockTransport::new();
        let mut response = encode_measure_response(1.0, 2.0);
        response[3] ^= 0x40;
        mock.inject_read(&response);
        let mut link = link(&mock);

        assert!(matches!(
            link.measure(),
            Err(ProtocolError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_short_write() {
        let mock = MockTransport::new();
        mock.set_write_limit(1);
        let mut link = link(&mock);

        assert_eq!(
            link.write_all(&[1, 2, 3]),
            Err(ProtocolError::ShortWrite {
                written: 1,
                expected: 3
            })
        );
    }

    #[test]
    fn test_closed_port() {
        let mock = MockTransport::new();
        mock.close();
        let mut link = link(&mock);

        assert_eq!(link.measure(), Err(ProtocolError::PortClosed));
    }
}
