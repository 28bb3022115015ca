//! System context and wiring
//!
//! [`RocamSystem`] owns every worker thread and is the only place components
//! are connected to each other. [`RocamHandle`] is the thin, clonable API
//! surface used by the control socket (or any embedding HTTP layer).
//!
//! ```text
//! producer ─▶ DetectionChannel ─▶ DetectionHistory
//!                    │
//!                    └──────────▶ Tracker ──┐
//! operator ─▶ IntentQueue ─▶ Controller ────┼─▶ GimbalDriver ─▶ serial link
//! status   ◀─ SharedState + AngleCache ◀────┘
//! ```

use crate::config::AppConfig;
use crate::control::ControlServer;
use crate::controller::{Controller, Intent, IntentQueue};
use crate::detection::{
    BoundingBox, DetectionChannel, DetectionHistory, DetectionRouter, Serializer,
};
use crate::error::{Error, Result};
use crate::gimbal::{self, GimbalDriver, Led, SerialGimbal, SimulatedGimbal};
use crate::state::{SharedState, Status};
use crate::supervisor::Supervisor;
use crate::tracking::{Tracker, TrackingWorker};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Clonable API over a running system
#[derive(Clone)]
pub struct RocamHandle {
    driver: Arc<dyn GimbalDriver>,
    state: Arc<SharedState>,
    history: Arc<DetectionHistory>,
    intents: IntentQueue,
}

impl RocamHandle {
    /// Current mode, arm flag, cached angles and last error; never blocks on I/O
    pub fn status(&self) -> Status {
        self.state.status(self.driver.angle_state())
    }

    pub fn enqueue_set_mode(&self, mode: &str) -> Result<()> {
        self.intents.enqueue(Intent::set_mode(mode)?)
    }

    pub fn enqueue_move(&self, direction: &str, step: f32) -> Result<()> {
        self.intents.enqueue(Intent::nudge(direction, step)?)
    }

    pub fn move_to(&self, tilt: f32, pan: f32) -> Result<()> {
        self.intents.enqueue(Intent::move_to(tilt, pan)?)
    }

    pub fn arm(&self) -> Result<()> {
        self.intents.enqueue(Intent::Arm)
    }

    pub fn disarm(&self) -> Result<()> {
        self.intents.enqueue(Intent::Disarm)
    }

    /// Detection to overlay on a preview frame shown at `frame_time`
    pub fn detection_for_preview(&self, frame_time: Instant) -> Option<BoundingBox> {
        self.history.detection_for_preview(frame_time)
    }

    /// Newest detection
    pub fn latest_detection(&self) -> Option<BoundingBox> {
        self.history.lookup(None)
    }
}

/// Running RoCam system
pub struct RocamSystem {
    handle: RocamHandle,
    running: Arc<AtomicBool>,
    controller: Controller,
    tracker: Tracker,
    supervisor: Option<Supervisor>,
    threads: Vec<JoinHandle<()>>,
    detection_addr: SocketAddr,
    control_addr: SocketAddr,
}

impl RocamSystem {
    /// Open the gimbal from config, falling back to the simulator if allowed
    pub fn open_driver(config: &AppConfig) -> Result<Arc<dyn GimbalDriver>> {
        match SerialGimbal::open(&config.gimbal) {
            Ok(gimbal) => Ok(Arc::new(gimbal)),
            Err(e @ Error::HardwareUnavailable(_)) if config.gimbal.fallback_to_simulated => {
                log::warn!("{}; continuing with simulated gimbal", e);
                Ok(Arc::new(SimulatedGimbal::new(config.gimbal.limits)))
            }
            Err(e) => Err(e),
        }
    }

    /// Start every worker from config
    pub fn start(config: &AppConfig, running: Arc<AtomicBool>) -> Result<Self> {
        let driver = Self::open_driver(config)?;
        Self::start_with_driver(config, driver, running)
    }

    /// Start every worker around an existing driver
    pub fn start_with_driver(
        config: &AppConfig,
        driver: Arc<dyn GimbalDriver>,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let state = Arc::new(SharedState::new());

        // A silent gimbal degrades to cached angles; only a missing port is fatal
        if let Err(e) = gimbal::seed_position(driver.as_ref()) {
            log::error!("Failed to seed gimbal position: {}", e);
            state.record_error(&e);
        }
        if let Err(e) = driver.set_led(Led::Status, true) {
            log::warn!("Failed to light status LED: {}", e);
        }

        let history = Arc::new(DetectionHistory::new(Duration::from_secs_f64(
            config.detection.preview_delay_ms.max(0.0) / 1000.0,
        )));

        let controller = Controller::spawn(
            Arc::clone(&driver),
            Arc::clone(&state),
            config.controller.queue_capacity,
            Arc::clone(&running),
        )?;

        let tracker = Tracker::spawn(
            TrackingWorker::new(Arc::clone(&driver), Arc::clone(&state), config.tracking),
            Arc::clone(&running),
        )?;

        let handle = RocamHandle {
            driver: Arc::clone(&driver),
            state: Arc::clone(&state),
            history: Arc::clone(&history),
            intents: controller.queue(),
        };

        let mut threads = Vec::new();

        let router = DetectionRouter::new(history, Arc::clone(&state), Some(tracker.handle()));
        let channel = DetectionChannel::bind(
            config.detection.bind_address.as_str(),
            Serializer::new(config.detection.wire_format),
            router,
            Arc::clone(&running),
        )?;
        let detection_addr = channel.local_addr()?;
        threads.push(channel.spawn()?);

        let control = ControlServer::bind(
            config.control.bind_address.as_str(),
            Serializer::new(config.control.wire_format),
            handle.clone(),
            Arc::clone(&running),
        )?;
        let control_addr = control.local_addr()?;
        threads.push(control.spawn()?);

        if let Some(interval_ms) = config.gimbal.sample_interval_ms {
            threads.push(spawn_sampler(
                Arc::clone(&driver),
                Duration::from_millis(interval_ms.max(1)),
                Arc::clone(&running),
            )?);
        }

        let supervisor = match config.detection.producer.clone() {
            Some(producer) => Some(Supervisor::spawn(producer, Arc::clone(&running))?),
            None => {
                log::info!("No producer configured; expecting an external connection");
                None
            }
        };

        log::info!("RoCam system started");
        Ok(Self {
            handle,
            running,
            controller,
            tracker,
            supervisor,
            threads,
            detection_addr,
            control_addr,
        })
    }

    /// API handle
    pub fn handle(&self) -> RocamHandle {
        self.handle.clone()
    }

    /// Bound address of the detection channel
    pub fn detection_addr(&self) -> SocketAddr {
        self.detection_addr
    }

    /// Bound address of the control socket
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop every worker, kill the producer and switch the LEDs off
    pub fn shutdown(mut self) {
        log::info!("Shutting down...");
        self.running.store(false, Ordering::Relaxed);

        if let Some(mut supervisor) = self.supervisor.take() {
            supervisor.stop();
        }
        self.controller.join();
        self.tracker.join();
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                log::error!("Worker thread panicked during shutdown");
            }
        }

        for led in [Led::Arm, Led::Status] {
            if let Err(e) = self.handle.driver.set_led(led, false) {
                log::warn!("Failed to switch off {:?} LED: {}", led, e);
            }
        }
        log::info!("RoCam system stopped");
    }
}

/// Periodic background refresh so the cache follows the hardware while idle
fn spawn_sampler(
    driver: Arc<dyn GimbalDriver>,
    interval: Duration,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("angle-sampler".to_string())
        .spawn(move || {
            log::info!("Angle sampler started ({:?} interval)", interval);
            while running.load(Ordering::Relaxed) {
                driver.refresh();
                thread::sleep(interval);
            }
            log::info!("Angle sampler stopped");
        })
        .map_err(|e| Error::Other(format!("Failed to spawn angle sampler: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gimbal::Angles;
    use crate::transport::MockTransport;

    fn local_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.detection.bind_address = "127.0.0.1:0".to_string();
        config.control.bind_address = "127.0.0.1:0".to_string();
        config.gimbal.strict_ack = true;
        config.gimbal.timeout_ms = 20;
        config
    }

    #[test]
    fn test_silent_gimbal_starts_degraded() {
        let config = local_config();
        let mock = MockTransport::new();
        let driver: Arc<dyn GimbalDriver> =
            Arc::new(SerialGimbal::new(Box::new(mock.clone()), &config.gimbal).unwrap());
        let running = Arc::new(AtomicBool::new(true));

        let system = RocamSystem::start_with_driver(&config, driver, running).unwrap();
        let status = system.handle().status();

        assert_eq!(status.angle, Angles::default());
        assert!(status.last_error.is_some());
        // measure, homing move, status LED
        assert_eq!(mock.written_packets().len(), 3);

        system.shutdown();
    }
}
