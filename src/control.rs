//! Local control socket
//!
//! Thin request/response surface over [`RocamHandle`], using the same
//! length-prefixed framing as the detection channel. Every request is
//! answered with the current status or with the reason it was rejected.
//! Motion intents are queued; the status in the reply is taken right after
//! enqueueing, before the controller has necessarily processed them.
//!
//! | Request                        | Effect                       |
//! |--------------------------------|------------------------------|
//! | `status`                       | none                         |
//! | `{"set_mode":{"mode":"auto"}}` | queue mode change            |
//! | `{"move":{"direction":"up","step":1.0}}` | queue nudge (MANUAL only) |
//! | `{"move_to":{"tilt":10,"pan":0}}` | queue absolute move (MANUAL only) |
//! | `arm` / `disarm`               | queue arm / disarm           |

use crate::app::RocamHandle;
use crate::detection::wire::{self, FrameReader, Serializer};
use crate::error::{Error, Result};
use crate::state::Status;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(10);
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Control request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    SetMode { mode: String },
    Move { direction: String, step: f32 },
    MoveTo { tilt: f32, pan: f32 },
    Arm,
    Disarm,
}

/// Control reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlResponse {
    Status(Status),
    Error(String),
}

/// Apply one request and build its reply
pub fn handle_request(api: &RocamHandle, request: &ControlRequest) -> ControlResponse {
    let result = match request {
        ControlRequest::Status => Ok(()),
        ControlRequest::SetMode { mode } => api.enqueue_set_mode(mode),
        ControlRequest::Move { direction, step } => api.enqueue_move(direction, *step),
        ControlRequest::MoveTo { tilt, pan } => api.move_to(*tilt, *pan),
        ControlRequest::Arm => api.arm(),
        ControlRequest::Disarm => api.disarm(),
    };

    match result {
        Ok(()) => ControlResponse::Status(api.status()),
        Err(e) => {
            log::warn!("Control request {:?} rejected: {}", request, e);
            ControlResponse::Error(e.to_string())
        }
    }
}

/// Control socket server (one client at a time)
pub struct ControlServer {
    listener: TcpListener,
    serializer: Serializer,
    api: RocamHandle,
    running: Arc<AtomicBool>,
    frames: FrameReader,
}

impl ControlServer {
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        serializer: Serializer,
        api: RocamHandle,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        log::info!("Control socket listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            serializer,
            api,
            running,
            frames: FrameReader::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn spawn(mut self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("control".to_string())
            .spawn(move || self.run())
            .map_err(|e| Error::Other(format!("Failed to spawn control server: {}", e)))
    }

    pub fn run(&mut self) {
        while self.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    log::info!("Control client connected: {}", addr);
                    if let Err(e) = self.serve(stream) {
                        log::error!("Control client error: {}", e);
                    }
                    log::info!("Control client disconnected: {}", addr);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    log::error!("Control accept error: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
        log::info!("Control socket stopped");
    }

    fn serve(&mut self, mut stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
            log::warn!("Failed to set read timeout: {}", e);
        }

        self.frames.reset();
        while self.running.load(Ordering::Relaxed) {
            let payload = match self.frames.read_frame(&mut stream) {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) if wire::is_disconnect(&e) => return Ok(()),
                Err(e) => return Err(e),
            };

            let response = match self.serializer.deserialize::<ControlRequest>(payload) {
                Ok(request) => {
                    log::debug!("Control request: {:?}", request);
                    handle_request(&self.api, &request)
                }
                Err(e) => ControlResponse::Error(format!("malformed request: {}", e)),
            };

            let payload = self.serializer.serialize(&response)?;
            wire::write_frame(&mut stream, &payload)?;
        }
        let _ = stream.shutdown(std::net::Shutdown::Both);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::WireFormat;

    #[test]
    fn test_request_json_shape() {
        let serializer = Serializer::new(WireFormat::Json);
        let request: ControlRequest = serializer
            .deserialize(br#"{"move":{"direction":"up","step":2.5}}"#)
            .unwrap();
        assert_eq!(
            request,
            ControlRequest::Move {
                direction: "up".to_string(),
                step: 2.5
            }
        );

        let request: ControlRequest = serializer.deserialize(br#""arm""#).unwrap();
        assert_eq!(request, ControlRequest::Arm);
    }

    #[test]
    fn test_postcard_requests() {
        let serializer = Serializer::new(WireFormat::Postcard);
        let request = ControlRequest::MoveTo {
            tilt: 10.0,
            pan: -3.0,
        };
        let bytes = serializer.serialize(&request).unwrap();
        let decoded: ControlRequest = serializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, request);
    }
}
