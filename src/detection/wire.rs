//! Wire format and framing for local TCP channels
//!
//! Both the detection channel and the control socket use the same framing:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON or Postcard binary  │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! - Maximum payload: 1 MiB; a larger length closes the connection
//! - A payload that fails to deserialize is logged and skipped, the
//!   connection stays open
//!
//! Detection frames carry `Option<BoundingBox>`: `null` (JSON) means the
//! producer saw nothing in that frame.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};

/// Largest accepted payload
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Supported wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Binary format using postcard - fast and compact
    Postcard,
    /// JSON format - human-readable for debugging
    #[default]
    Json,
}

/// Serializer that can handle both formats
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    format: WireFormat,
}

impl Serializer {
    /// Create a new serializer for the given format
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Serialize a value to bytes
    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self.format {
            WireFormat::Postcard => {
                postcard::to_allocvec(value).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Deserialize bytes to a value
    pub fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self.format {
            WireFormat::Postcard => {
                postcard::from_bytes(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
            WireFormat::Json => {
                serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }
}

/// Write one length-prefixed frame
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::Other(format!(
            "Message too large: {} bytes",
            payload.len()
        )));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Incremental reader for length-prefixed frames
///
/// A read timeout mid-frame keeps the bytes received so far, so a peer
/// that stalls between writes resumes where it left off instead of
/// desynchronizing the stream.
#[derive(Debug, Default)]
pub struct FrameReader {
    header: [u8; 4],
    header_filled: usize,
    payload: Vec<u8>,
    payload_filled: usize,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a frame has started but not completed
    pub fn in_progress(&self) -> bool {
        self.header_filled > 0
    }

    /// Drop any partial frame (new connection)
    pub fn reset(&mut self) {
        self.header_filled = 0;
        self.payload.clear();
        self.payload_filled = 0;
    }

    /// Read until one frame completes
    ///
    /// Returns `Ok(None)` when the reader times out, so the caller can check
    /// its shutdown flag; the partial frame is kept for the next call. EOF
    /// surfaces as an `UnexpectedEof` I/O error.
    pub fn read_frame<R: Read>(&mut self, reader: &mut R) -> Result<Option<&[u8]>> {
        while self.header_filled < self.header.len() {
            let start = self.header_filled;
            match fill(reader, &mut self.header[start..])? {
                Some(n) => self.header_filled += n,
                None => return Ok(None),
            }
            if self.header_filled == self.header.len() {
                let len = u32::from_be_bytes(self.header) as usize;
                if len > MAX_FRAME_LEN {
                    self.reset();
                    return Err(Error::Other(format!("Message too large: {} bytes", len)));
                }
                self.payload.clear();
                self.payload.resize(len, 0);
                self.payload_filled = 0;
            }
        }

        while self.payload_filled < self.payload.len() {
            let start = self.payload_filled;
            match fill(reader, &mut self.payload[start..])? {
                Some(n) => self.payload_filled += n,
                None => return Ok(None),
            }
        }

        self.header_filled = 0;
        Ok(Some(&self.payload))
    }
}

/// One `read` call: `Some(n)` bytes, `None` on timeout
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<Option<usize>> {
    loop {
        match reader.read(buf) {
            Ok(0) => return Err(Error::Io(ErrorKind::UnexpectedEof.into())),
            Ok(n) => return Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

/// True if `err` means the peer went away
pub fn is_disconnect(err: &Error) -> bool {
    matches!(
        err,
        Error::Io(e) if matches!(
            e.kind(),
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;
    use std::collections::VecDeque;
    use std::io::Cursor;

    fn sample() -> BoundingBox {
        BoundingBox {
            pts_s: 12.5,
            conf: 0.8,
            left: 0.1,
            top: 0.2,
            width: 0.3,
            height: 0.4,
        }
    }

    #[test]
    fn test_frame_layout() {
        let mut out = Vec::new();
        write_frame(&mut out, b"abc").unwrap();
        assert_eq!(out, vec![0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_detection_frames_both_formats() {
        for format in [WireFormat::Json, WireFormat::Postcard] {
            let serializer = Serializer::new(format);
            let mut stream = Vec::new();
            write_frame(&mut stream, &serializer.serialize(&Some(sample())).unwrap()).unwrap();
            write_frame(&mut stream, &serializer.serialize(&None::<BoundingBox>).unwrap()).unwrap();

            let mut reader = Cursor::new(stream);
            let mut frames = FrameReader::new();
            let payload = frames.read_frame(&mut reader).unwrap().unwrap();
            let first: Option<BoundingBox> = serializer.deserialize(payload).unwrap();
            assert_eq!(first, Some(sample()));

            let payload = frames.read_frame(&mut reader).unwrap().unwrap();
            let second: Option<BoundingBox> = serializer.deserialize(payload).unwrap();
            assert_eq!(second, None);

            let err = frames.read_frame(&mut reader).unwrap_err();
            assert!(is_disconnect(&err));
        }
    }

    /// Reader that hands out scripted chunks, with `None` meaning a timeout
    struct StallingReader {
        chunks: VecDeque<Option<Vec<u8>>>,
    }

    impl StallingReader {
        fn new(chunks: Vec<Option<Vec<u8>>>) -> Self {
            Self {
                chunks: chunks.into(),
            }
        }
    }

    impl Read for StallingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.chunks.pop_front() {
                None => Ok(0),
                Some(None) => Err(ErrorKind::TimedOut.into()),
                Some(Some(mut chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.chunks.push_front(Some(chunk.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    #[test]
    fn test_stalled_frame_resumes_after_timeout() {
        let mut first = Vec::new();
        write_frame(&mut first, b"hello").unwrap();
        let mut second = Vec::new();
        write_frame(&mut second, b"world!").unwrap();

        // stall inside the length prefix, then inside the payload
        let mut reader = StallingReader::new(vec![
            Some(first[..2].to_vec()),
            None,
            Some(first[2..6].to_vec()),
            None,
            None,
            Some(first[6..].to_vec()),
            Some(second),
        ]);
        let mut frames = FrameReader::new();

        assert_eq!(frames.read_frame(&mut reader).unwrap(), None);
        assert!(frames.in_progress());
        assert_eq!(frames.read_frame(&mut reader).unwrap(), None);
        assert_eq!(frames.read_frame(&mut reader).unwrap(), None);
        assert_eq!(frames.read_frame(&mut reader).unwrap(), Some(&b"hello"[..]));
        assert!(!frames.in_progress());
        assert_eq!(frames.read_frame(&mut reader).unwrap(), Some(&b"world!"[..]));

        let err = frames.read_frame(&mut reader).unwrap_err();
        assert!(is_disconnect(&err));
    }

    #[test]
    fn test_empty_frame() {
        let mut reader = Cursor::new(vec![0, 0, 0, 0]);
        let mut frames = FrameReader::new();
        assert_eq!(frames.read_frame(&mut reader).unwrap(), Some(&[][..]));
    }

    #[test]
    fn test_json_detection_shape() {
        let json = r#"{"pts_s":1.0,"conf":0.5,"left":0.0,"top":0.0,"width":1.0,"height":1.0}"#;
        let bbox: Option<BoundingBox> = Serializer::new(WireFormat::Json)
            .deserialize(json.as_bytes())
            .unwrap();
        assert_eq!(bbox.unwrap().center(), (0.5, 0.5));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut reader = Cursor::new(vec![0xFF, 0xFF, 0xFF, 0xFF]);
        let mut frames = FrameReader::new();
        assert!(frames.read_frame(&mut reader).is_err());
        assert!(!frames.in_progress());
    }
}
