//! Detections from the external producer
//!
//! - [`history`]: timestamp-indexed ring for preview correlation
//! - [`wire`]: length-prefixed frame codec
//! - [`channel`]: single-connection receive loop feeding history and tracker

mod bbox;
pub mod channel;
pub mod history;
pub mod wire;

pub use bbox::BoundingBox;
pub use channel::{DetectionChannel, DetectionRouter};
pub use history::{DetectionEntry, DetectionHistory};
pub use wire::{Serializer, WireFormat};
