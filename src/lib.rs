//! RoCam IO - pan/tilt gimbal control and visual tracking
//!
//! Drives a two-axis gimbal over a CRC-checked serial protocol and closes a
//! tracking loop around detections streamed by an external producer process.
//!
//! ## Layers
//!
//! - [`protocol`]: packet codec (pure)
//! - [`transport`]: byte I/O (serial port, mock)
//! - [`gimbal`]: serialized link, angle cache, executor trait and implementations
//! - [`controller`], [`tracking`]: the two consumers that move the gimbal
//! - [`detection`], [`supervisor`]: producer process and its channel
//! - [`control`]: local control socket
//! - [`app`]: system context wiring it all together

pub mod app;
pub mod config;
pub mod control;
pub mod controller;
pub mod detection;
pub mod error;
pub mod gimbal;
pub mod protocol;
pub mod state;
pub mod supervisor;
pub mod tracking;
pub mod transport;

// Re-export commonly used types
pub use app::{RocamHandle, RocamSystem};
pub use config::AppConfig;
pub use error::{Error, Result};
