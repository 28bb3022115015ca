//! Detection channel from the producer process
//!
//! Owns one local TCP listener for the whole process lifetime. One producer
//! connection is served at a time; when it closes, the loop goes back to
//! accepting on the same listener, so a respawned producer simply reconnects.
//!
//! ```text
//! producer ──frames──▶ DetectionChannel ──▶ DetectionRouter ─┬─▶ DetectionHistory
//!                                                            └─▶ Tracker (armed + auto)
//! ```

use super::wire::{self, FrameReader, Serializer};
use super::{BoundingBox, DetectionHistory};
use crate::error::{Error, Result};
use crate::state::SharedState;
use crate::tracking::TrackerHandle;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Accept poll interval while no producer is connected
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Read timeout so the receive loop can observe shutdown
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Fans detections out to the history and the tracker
#[derive(Clone)]
pub struct DetectionRouter {
    history: Arc<DetectionHistory>,
    state: Arc<SharedState>,
    tracker: Option<TrackerHandle>,
}

impl DetectionRouter {
    pub fn new(
        history: Arc<DetectionHistory>,
        state: Arc<SharedState>,
        tracker: Option<TrackerHandle>,
    ) -> Self {
        Self {
            history,
            state,
            tracker,
        }
    }

    /// Route one frame's detection (`None` when nothing was detected)
    pub fn route(&self, detection: Option<BoundingBox>) {
        if let Some(bbox) = detection {
            self.history.record(bbox);
        }
        if let Some(tracker) = self.tracker.as_ref()
            && self.state.is_tracking()
        {
            tracker.submit(detection);
        }
    }
}

/// Single-connection detection receiver
pub struct DetectionChannel {
    listener: TcpListener,
    serializer: Serializer,
    router: DetectionRouter,
    running: Arc<AtomicBool>,
    connections: Arc<AtomicU64>,
    frames: FrameReader,
}

impl DetectionChannel {
    /// Bind the listening endpoint
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        serializer: Serializer,
        router: DetectionRouter,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        log::info!(
            "Detection channel listening on {} ({:?})",
            listener.local_addr()?,
            serializer.format()
        );

        Ok(Self {
            listener,
            serializer,
            router,
            running,
            connections: Arc::new(AtomicU64::new(0)),
            frames: FrameReader::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Counter of accepted producer connections
    pub fn connection_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.connections)
    }

    /// Run the receive loop on its own thread
    pub fn spawn(mut self) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("detection-rx".to_string())
            .spawn(move || self.run())
            .map_err(|e| Error::Other(format!("Failed to spawn detection channel: {}", e)))
    }

    /// Accept and serve producers until shutdown
    pub fn run(&mut self) {
        while self.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let count = self.connections.fetch_add(1, Ordering::Relaxed) + 1;
                    log::info!("Producer connected: {} (connection #{})", addr, count);
                    self.serve(stream);
                    log::info!("Producer disconnected: {}", addr);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    log::error!("Detection accept error: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
        log::info!("Detection channel stopped");
    }

    fn serve(&mut self, mut stream: TcpStream) {
        if let Err(e) = stream.set_nonblocking(false) {
            log::error!("Failed to set producer socket to blocking mode: {}", e);
            return;
        }
        if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
            log::warn!("Failed to set read timeout: {}", e);
        }

        self.frames.reset();
        while self.running.load(Ordering::Relaxed) {
            match self.frames.read_frame(&mut stream) {
                Ok(Some(payload)) => {
                    match self.serializer.deserialize::<Option<BoundingBox>>(payload) {
                        Ok(detection) => self.router.route(detection),
                        Err(e) => log::warn!("Discarding malformed detection: {}", e),
                    }
                }
                Ok(None) => {}
                Err(e) if wire::is_disconnect(&e) => return,
                Err(e) => {
                    log::warn!("Producer connection error: {}", e);
                    return;
                }
            }
        }
        let _ = stream.shutdown(std::net::Shutdown::Both);
    }
}
