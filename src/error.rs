//! Error types for RoCam IO
//!
//! Errors are split by the layer that raises them:
//! - [`ProtocolError`]: link and packet level failures, always surfaced to the caller
//! - [`CommandError`]: intent validation, rejected before anything reaches the link
//! - [`Error`]: crate-wide error wrapping both plus startup/configuration failures

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to the gimbal over the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The underlying port is gone (closed or unplugged)
    #[error("serial port is not open")]
    PortClosed,

    /// Fewer bytes were written than the packet length
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes actually accepted by the port
        written: usize,
        /// Packet length
        expected: usize,
    },

    /// Response did not arrive in full before the I/O timeout
    #[error("timeout waiting for {expected} response bytes")]
    Timeout {
        /// Number of bytes the response should have had
        expected: usize,
    },

    /// Response checksum does not match its contents
    #[error("CRC mismatch: got {actual:#04x}, expected {expected:#04x}")]
    CrcMismatch {
        /// CRC computed over the received payload
        expected: u8,
        /// CRC byte carried by the response
        actual: u8,
    },

    /// Device answered a set-type request with something other than 0x00
    #[error("device NACK: {0:#04x}")]
    Nack(u8),

    /// Packet could not be parsed (unknown request id or wrong length)
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}

/// Intent validation failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// Unknown mode name
    #[error("mode must be 'manual' or 'auto', got '{0}'")]
    InvalidMode(String),

    /// Unknown direction name
    #[error("direction must be up/down/left/right, got '{0}'")]
    InvalidDirection(String),

    /// Step is zero, negative or not finite
    #[error("step must be a positive number, got {0}")]
    InvalidStep(f32),

    /// Target angle is not finite
    #[error("target angle must be finite (tilt={tilt}, pan={pan})")]
    InvalidAngle {
        /// Requested tilt
        tilt: f32,
        /// Requested pan
        pan: f32,
    },

    /// Manual motion requested while the controller is in AUTO
    #[error("movement is only allowed in MANUAL mode")]
    NotManual,
}

/// RoCam IO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Link or packet failure
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Rejected intent
    #[error("{0}")]
    Command(#[from] CommandError),

    /// Gimbal link could not be opened at startup
    #[error("hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration serialize error
    #[error("config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Wire (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Intent mailbox is full or the controller has stopped
    #[error("command queue unavailable: {0}")]
    QueueUnavailable(&'static str),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
